// src/wiki/views.rs
use crate::html::escape;
use crate::wiki::api::{edit_path, entry_path};
use pulldown_cmark::{html, Options, Parser};
use std::fmt::Write;

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>{title}</title>
  </head>
  <body>
    <div class="sidebar">
      <h2>Wiki</h2>
      <form action="/" method="get">
        <input class="search" type="text" name="q" placeholder="Search Encyclopedia">
      </form>
      <div><a href="/">Home</a></div>
      <div><a href="/create">Create New Page</a></div>
      <div><a href="/random">Random Page</a></div>
    </div>
    <div class="main">
{body}
    </div>
  </body>
</html>
"#,
        title = escape(title),
    )
}

fn title_list(titles: &[String]) -> String {
    let mut items = String::new();
    for title in titles {
        let _ = write!(
            items,
            "\n        <li><a href=\"{}\">{}</a></li>",
            escape(&entry_path(title)),
            escape(title)
        );
    }
    format!("      <ul>{items}\n      </ul>")
}

/// Converts entry markdown to HTML.
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(markdown, options));
    out
}

pub fn index(titles: &[String]) -> String {
    let body = format!("      <h1>All Pages</h1>\n{}", title_list(titles));
    layout("Encyclopedia", &body)
}

pub fn results(query: &str, titles: &[String]) -> String {
    let body = format!(
        "      <h1>Search Results for \"{}\"</h1>\n{}",
        escape(query),
        title_list(titles)
    );
    layout("Search Results", &body)
}

pub fn entry(title: &str, content: &str) -> String {
    let body = format!(
        "{}\n      <a href=\"{}\">Edit</a>",
        render_markdown(content),
        escape(&edit_path(title)),
    );
    layout(title, &body)
}

pub fn create() -> String {
    let body = r#"      <h1>Create New Page</h1>
      <form action="/create" method="post">
        <div><input type="text" name="title" placeholder="Title"></div>
        <div><textarea name="content" rows="20" placeholder="Markdown content"></textarea></div>
        <button type="submit">Save</button>
      </form>"#;
    layout("Create New Page", body)
}

pub fn edit(title: &str, content: &str) -> String {
    let action = edit_path(title);
    let body = format!(
        r#"      <h1>Edit {title}</h1>
      <form action="{action}" method="post">
        <div><textarea name="content" rows="20">{content}</textarea></div>
        <button type="submit">Save</button>
      </form>"#,
        title = escape(title),
        action = escape(&action),
        content = escape(content),
    );
    layout(&format!("Edit {title}"), &body)
}

pub fn notice(message: &str) -> String {
    let body = format!("      <h1>{}</h1>", escape(message));
    layout("Encyclopedia", &body)
}
