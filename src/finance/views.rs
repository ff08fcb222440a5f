// src/finance/views.rs
//! Server-rendered pages for the trading ledger.

use crate::finance::models::{Holding, Portfolio, Quote, Transaction};
use crate::html::{escape, usd};
use std::fmt::Write;

fn layout(title: &str, logged_in: bool, body: &str) -> String {
    let nav = if logged_in {
        r#"<ul class="nav">
        <li><a href="/quote">Quote</a></li>
        <li><a href="/buy">Buy</a></li>
        <li><a href="/sell">Sell</a></li>
        <li><a href="/history">History</a></li>
        <li><a href="/add_cash">Add Cash</a></li>
        <li><a href="/change_password">Change Password</a></li>
        <li><a href="/logout">Log Out</a></li>
      </ul>"#
    } else {
        r#"<ul class="nav">
        <li><a href="/register">Register</a></li>
        <li><a href="/login">Log In</a></li>
      </ul>"#
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="initial-scale=1, width=device-width">
    <title>C$50 Finance: {title}</title>
  </head>
  <body>
    <nav>
      <a href="/">C$50 Finance</a>
      {nav}
    </nav>
    <main>
{body}
    </main>
  </body>
</html>
"#,
        title = escape(title),
    )
}

pub fn apology(code: u16, message: &str) -> String {
    let body = format!(
        r#"      <div class="apology">
        <h1>{code}</h1>
        <p>{}</p>
      </div>"#,
        escape(message)
    );
    layout("Apology", false, &body)
}

pub fn index(portfolio: &Portfolio) -> String {
    let mut rows = String::new();
    for row in &portfolio.rows {
        let _ = write!(
            rows,
            r#"
          <tr>
            <td>{}</td>
            <td>{}</td>
            <td>{}</td>
            <td>{}</td>
            <td>{}</td>
          </tr>"#,
            escape(&row.holding.symbol),
            escape(&row.holding.name),
            row.holding.shares,
            usd(row.price),
            usd(row.total)
        );
    }

    let body = format!(
        r#"      <table class="portfolio">
        <thead>
          <tr><th>Symbol</th><th>Name</th><th>Shares</th><th>Price</th><th>TOTAL</th></tr>
        </thead>
        <tbody>{rows}
        </tbody>
        <tfoot>
          <tr><td colspan="4">CASH</td><td>{cash}</td></tr>
          <tr><td colspan="4"></td><td><b>{total}</b></td></tr>
        </tfoot>
      </table>"#,
        cash = usd(portfolio.cash),
        total = usd(portfolio.total),
    );
    layout("Portfolio", true, &body)
}

fn form(action: &str, fields: &str, button: &str) -> String {
    format!(
        r#"      <form action="{action}" method="post">
{fields}
        <button type="submit">{button}</button>
      </form>"#
    )
}

fn input(name: &str, kind: &str, placeholder: &str) -> String {
    format!(
        r#"        <div><input autocomplete="off" name="{name}" placeholder="{placeholder}" type="{kind}"></div>"#
    )
}

pub fn login() -> String {
    let fields = [
        input("username", "text", "Username"),
        input("password", "password", "Password"),
    ]
    .join("\n");
    layout("Log In", false, &form("/login", &fields, "Log In"))
}

pub fn register() -> String {
    let fields = [
        input("username", "text", "Username"),
        input("password", "password", "Password"),
        input("confirmation", "password", "Password (again)"),
    ]
    .join("\n");
    layout("Register", false, &form("/register", &fields, "Register"))
}

pub fn quote() -> String {
    layout(
        "Quote",
        true,
        &form("/quote", &input("symbol", "text", "Symbol"), "Quote"),
    )
}

pub fn quoted(quote: &Quote) -> String {
    let body = format!(
        "      <p>A share of {} ({}) costs {}.</p>",
        escape(&quote.name),
        escape(&quote.symbol),
        usd(quote.price)
    );
    layout("Quoted", true, &body)
}

pub fn buy() -> String {
    let fields = [
        input("symbol", "text", "Symbol"),
        input("shares", "number", "Shares"),
    ]
    .join("\n");
    layout("Buy", true, &form("/buy", &fields, "Buy"))
}

pub fn sell(holdings: &[Holding]) -> String {
    let mut options = String::from(r#"<option disabled selected value="">Symbol</option>"#);
    for holding in holdings {
        let _ = write!(
            options,
            r#"<option value="{0}">{0} ({1})</option>"#,
            escape(&holding.symbol),
            holding.shares
        );
    }
    let fields = format!(
        "        <div><select name=\"symbol\">{options}</select></div>\n{}",
        input("shares", "number", "Shares")
    );
    layout("Sell", true, &form("/sell", &fields, "Sell"))
}

pub fn history(transactions: &[Transaction]) -> String {
    let mut rows = String::new();
    for tx in transactions {
        let _ = write!(
            rows,
            r#"
          <tr>
            <td>{}</td>
            <td>{}</td>
            <td>{}</td>
            <td>{}</td>
            <td>{}</td>
          </tr>"#,
            escape(&tx.symbol),
            escape(&tx.name),
            tx.shares,
            usd(tx.price),
            tx.date.format("%Y-%m-%d %H:%M:%S")
        );
    }

    let body = format!(
        r#"      <table class="history">
        <thead>
          <tr><th>Symbol</th><th>Name</th><th>Shares</th><th>Price</th><th>Transacted</th></tr>
        </thead>
        <tbody>{rows}
        </tbody>
      </table>"#
    );
    layout("History", true, &body)
}

pub fn add_cash() -> String {
    layout(
        "Add Cash",
        true,
        &form("/add_cash", &input("cash", "number", "Amount"), "Add Cash"),
    )
}

pub fn change_password() -> String {
    let fields = [
        input("current_password", "password", "Current password"),
        input("password", "password", "New password"),
        input("confirmation", "password", "New password (again)"),
    ]
    .join("\n");
    layout(
        "Change Password",
        true,
        &form("/change_password", &fields, "Change Password"),
    )
}
