//! # HTML Renderer
//!
//! Turns the final Markdown draft into a standalone HTML page:
//!
//! 1. Markdown to HTML with `pulldown-cmark`
//! 2. list reconstruction and section wrapping over the owned [`tree`]
//! 3. heading anchors and a navigation list
//! 4. the fixed page template with an inline stylesheet
//!
//! [`render`] never fails: errors become a small page that reports them.

pub mod structure;
pub mod tree;

use chrono::{DateTime, Datelike, Local};
use pulldown_cmark::{html, Options, Parser};
use tracing::{error, info};

use crate::error::RenderError;
use structure::{assign_heading_ids, outline, reconstruct_lists, wrap_sections, OutlineEntry};
use tree::{escape_attr, escape_text, parse_fragment, to_html};

/// Deepest heading level listed in the page navigation.
const NAV_MAX_LEVEL: u8 = 2;

const STYLESHEET: &str = r#"
        body {
            font-family: Arial, sans-serif;
            line-height: 1.6;
            color: #333;
            max-width: 800px;
            margin: 0 auto;
            padding: 20px;
        }
        header {
            background-color: #f4f4f4;
            padding: 20px;
            margin-bottom: 20px;
        }
        h1, h2, h3, h4 {
            color: #2c3e50;
        }
        a {
            color: #3498db;
            text-decoration: none;
        }
        a:hover {
            text-decoration: underline;
        }
        .timestamp {
            font-style: italic;
            color: #7f8c8d;
        }
        nav {
            background-color: #ecf0f1;
            padding: 10px;
            margin-bottom: 20px;
        }
        nav ul {
            list-style-type: none;
            padding: 0;
        }
        nav ul li {
            display: inline;
            margin-right: 10px;
        }
        nav ul li.nav-sub {
            font-size: 0.9em;
        }
        ul, ol {
            padding-left: 20px;
        }
        table {
            border-collapse: collapse;
        }
        th, td {
            border: 1px solid #ccc;
            padding: 4px 8px;
        }
        @media (max-width: 600px) {
            body {
                padding: 10px;
            }
        }
"#;

/// Render a report page stamped with the current time.
pub fn render(markdown: &str, title: &str) -> String {
    render_at(markdown, title, Local::now())
}

/// Render a report page as of `now`. Same inputs give the same bytes.
pub fn render_at(markdown: &str, title: &str, now: DateTime<Local>) -> String {
    info!(title = %title, "Generating HTML report");

    match render_body(markdown) {
        Ok((body, nav)) => {
            info!("HTML report generated");
            page(title, &body, &nav, now)
        }
        Err(e) => {
            error!(error = %e, "Failed to generate HTML report");
            error_page(&e)
        }
    }
}

/// Convert Markdown and restructure it. Returns the body HTML and the
/// navigation entries.
fn render_body(markdown: &str) -> Result<(String, Vec<OutlineEntry>), RenderError> {
    if markdown.contains('\0') {
        return Err(RenderError::InvalidInput(
            "report text contains a NUL byte".to_string(),
        ));
    }

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut converted = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut converted, Parser::new_ext(markdown, options));

    let mut nodes = reconstruct_lists(parse_fragment(&converted)?);
    assign_heading_ids(&mut nodes);
    let nodes = wrap_sections(nodes);
    let nav = outline(&nodes, NAV_MAX_LEVEL);

    Ok((to_html(&nodes), nav))
}

fn nav_html(entries: &[OutlineEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            let class = if entry.level > 1 { r#" class="nav-sub""# } else { "" };
            format!(
                "                <li{class}><a href=\"#{}\">{}</a></li>\n",
                escape_attr(&entry.id),
                escape_text(&entry.title)
            )
        })
        .collect()
}

fn page(title: &str, body: &str, nav: &[OutlineEntry], now: DateTime<Local>) -> String {
    let title = escape_text(title);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{STYLESHEET}    </style>
</head>
<body>
    <header>
        <h1>{title}</h1>
        <p class="timestamp">Generated on: {timestamp}</p>
    </header>
    <nav>
        <ul>
{nav}        </ul>
    </nav>
    <main>
{body}
    </main>
    <footer>
        <p>&copy; {year} Research Report</p>
    </footer>
</body>
</html>
"#,
        timestamp = now.format("%Y-%m-%d %H:%M:%S"),
        nav = nav_html(nav),
        year = now.year(),
    )
}

fn error_page(error: &RenderError) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"UTF-8\"><title>Error</title></head>\n\
         <body><h1>Error</h1><p>Error generating HTML report: {}</p></body>\n</html>\n",
        escape_text(&error.to_string())
    )
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap()
    }

    const REPORT: &str = "# Solar Power\n\n\
        ## Introduction\n\n\
        Solar panels convert light.\n\n\
        ## Key Findings\n\n\
        • Costs fell\n\
        • Capacity grew\n\n\
        ### Detail\n\n\
        More text.\n\n\
        ## Conclusion\n\n\
        Done.\n";

    #[test]
    fn test_page_is_complete_document() {
        let html = render_at(REPORT, "Solar Power Report", fixed_time());

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.trim_end().ends_with("</html>"));
        assert!(html.contains("<title>Solar Power Report</title>"));
        assert!(html.contains("Generated on: 2024-05-17 09:30:00"));
        assert!(html.contains("&copy; 2024 Research Report"));
        assert!(html.contains("<main>"));
    }

    #[test]
    fn test_body_is_restructured() {
        let html = render_at(REPORT, "Solar", fixed_time());

        assert!(html.contains("<ul><li>Costs fell</li><li>Capacity grew</li></ul>"));
        assert!(html.contains("<section><h1 id=\"solar-power\">Solar Power</h1>"));
        assert!(html.contains(
            "<section><h3 id=\"detail\">Detail</h3>\n<p>More text.</p>\n</section></section>"
        ));
    }

    #[test]
    fn test_nav_links_to_top_headings() {
        let html = render_at(REPORT, "Solar", fixed_time());

        assert!(html.contains(r##"<li><a href="#solar-power">Solar Power</a></li>"##));
        assert!(html.contains(r##"<li class="nav-sub"><a href="#key-findings">Key Findings</a></li>"##));
        assert!(html.contains(r##"<a href="#conclusion">Conclusion</a>"##));
        assert!(!html.contains(r##"href="#detail""##));
    }

    #[test]
    fn test_render_is_deterministic() {
        let first = render_at(REPORT, "Solar", fixed_time());
        let second = render_at(REPORT, "Solar", fixed_time());
        assert_eq!(first, second);
    }

    #[test]
    fn test_title_is_escaped() {
        let html = render_at("text", "A <b> & C", fixed_time());
        assert!(html.contains("<title>A &lt;b&gt; &amp; C</title>"));
    }

    #[test]
    fn test_error_text_renders_as_paragraph() {
        let html = render_at(
            "Error enhancing report: Model completion failed: offline",
            "Topic",
            fixed_time(),
        );
        assert!(html.contains("<p>Error enhancing report: Model completion failed: offline</p>"));
    }

    #[test]
    fn test_invalid_input_gives_error_page() {
        let html = render_at("bad\0input", "Topic", fixed_time());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h1>Error</h1>"));
        assert!(html.contains("Invalid input: report text contains a NUL byte"));
    }

    #[test]
    fn test_empty_markdown_still_renders() {
        let html = render_at("", "Empty", fixed_time());
        assert!(html.contains("<main>"));
        assert!(html.contains("<ul>\n        </ul>"));
    }
}
