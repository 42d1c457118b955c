use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::db::models::Post;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static UNSAFE_FILE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Html,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Html => "html",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Html => "text/html; charset=utf-8",
        }
    }
}

pub fn render_markdown(post: &Post) -> String {
    format!(
        "# {}\n\n{}\n\n{}\n\n## Conclusion\n\n{}",
        post.title, post.introduction, post.body, post.conclusion
    )
}

/// One `<p>` per markdown line; the editor's preview does real rendering.
pub fn render_html(post: &Post) -> String {
    let paragraphs: String = render_markdown(post)
        .split('\n')
        .map(|line| format!("<p>{}</p>", escape_html(line)))
        .collect();
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\" /><title>{}</title></head><body>{}</body></html>",
        escape_html(&post.title),
        paragraphs
    )
}

/// `"My First Post"` becomes `"my-first-post.md"`. Only `[a-z0-9._-]`
/// survive in the stem so the name is always a valid quoted header value.
pub fn export_file_name(title: &str, format: ExportFormat) -> String {
    let dashed = WHITESPACE_RUN.replace_all(title.trim(), "-");
    let stem = UNSAFE_FILE_CHARS.replace_all(&dashed, "").to_lowercase();
    let stem = stem.trim_matches(|c| c == '.' || c == '-');
    let stem = if stem.is_empty() { "post" } else { stem };
    format!("{}.{}", stem, format.extension())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PostLength;
    use chrono::Utc;
    use uuid::Uuid;

    fn post() -> Post {
        let now = Utc::now();
        Post {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Ship <Fast> & Safe".into(),
            introduction: "Hello".into(),
            body: "## Why\nBecause".into(),
            conclusion: "Bye".into(),
            keywords: vec![],
            length: PostLength::Short,
            tone: "bold".into(),
            audience: "founders".into(),
            seo: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn markdown_layout() {
        assert_eq!(
            render_markdown(&post()),
            "# Ship <Fast> & Safe\n\nHello\n\n## Why\nBecause\n\n## Conclusion\n\nBye"
        );
    }

    #[test]
    fn html_escapes_text() {
        let html = render_html(&post());
        assert!(html.starts_with("<!doctype html>"));
        assert!(html.contains("<title>Ship &lt;Fast&gt; &amp; Safe</title>"));
        assert!(html.contains("<p>## Why</p><p>Because</p>"));
        assert!(!html.contains("<Fast>"));
    }

    #[test]
    fn file_name_from_title() {
        assert_eq!(export_file_name("My  First\tPost", ExportFormat::Markdown), "my-first-post.md");
        assert_eq!(export_file_name("Launch", ExportFormat::Html), "launch.html");
    }

    #[test]
    fn file_name_drops_header_breaking_characters() {
        assert_eq!(export_file_name("Say \"hi\"", ExportFormat::Markdown), "say-hi.md");
        assert_eq!(export_file_name("bell\x01 ring\r\n", ExportFormat::Markdown), "bell-ring.md");
        assert_eq!(export_file_name("Café: ünïcode/path", ExportFormat::Html), "caf-ncodepath.html");
        assert_eq!(export_file_name("\"\"\"", ExportFormat::Markdown), "post.md");
        assert_eq!(export_file_name("../etc", ExportFormat::Markdown), "etc.md");
    }
}
