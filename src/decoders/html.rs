/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! Lightweight, dependency-free conversion between the HTML and plain-text
//! inline body variants, used to synthesize the missing alternative when a
//! message only supplies one (see `Message::get_text_body`/`get_html_body`).

/// Tags that introduce a line break in the plain-text rendering.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre",
];

/// Strips HTML markup and decodes entities, producing a plain-text
/// approximation of the rendered page.
pub fn html_to_text(input: &str) -> String {
    let mut text = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    let mut in_tag = false;
    let mut tag_name = String::new();
    let mut in_script_or_style: Option<&'static str> = None;
    let mut last_was_space = true;

    while i < bytes.len() {
        let ch = input[i..].chars().next().unwrap();
        let ch_len = ch.len_utf8();

        if let Some(closing) = in_script_or_style {
            if ch == '<' && input[i..].to_lowercase().starts_with(&format!("</{closing}")) {
                in_script_or_style = None;
                in_tag = true;
                tag_name.clear();
            }
            i += ch_len;
            continue;
        }

        if in_tag {
            if ch == '>' {
                in_tag = false;
                let name = tag_name.trim().trim_start_matches('/').to_lowercase();
                if name == "script" {
                    in_script_or_style = Some("script");
                } else if name == "style" {
                    in_script_or_style = Some("style");
                } else if BLOCK_TAGS.contains(&name.as_str()) && !last_was_space {
                    text.push('\n');
                    last_was_space = true;
                }
                tag_name.clear();
            } else if ch == '"' || ch == '\'' {
                // Skip over a quoted attribute value so a literal `>` inside
                // it doesn't end the tag early.
                let quote = ch;
                i += ch_len;
                while i < bytes.len() && input[i..].chars().next() != Some(quote) {
                    i += input[i..].chars().next().unwrap().len_utf8();
                }
            } else if !ch.is_whitespace() && !tag_name.ends_with(' ') {
                // Only the leading run of non-whitespace bytes is the tag
                // name; once we've seen a space, the rest is attributes.
                tag_name.push(ch);
            } else if ch.is_whitespace() && !tag_name.is_empty() && !tag_name.ends_with(' ') {
                tag_name.push(' ');
            }
            i += ch_len;
            continue;
        }

        match ch {
            '<' => {
                in_tag = true;
                tag_name.clear();
            }
            '&' => {
                let (decoded, consumed) = decode_entity(&input[i..]);
                text.push(decoded);
                last_was_space = decoded.is_whitespace();
                i += consumed;
                continue;
            }
            c if c.is_whitespace() => {
                if !last_was_space {
                    text.push(' ');
                    last_was_space = true;
                }
            }
            c => {
                text.push(c);
                last_was_space = false;
            }
        }
        i += ch_len;
    }

    text.trim().to_string()
}

/// Decodes one `&entity;`/`&#NNN;`/`&#xHH;` reference starting at `input[0]
/// == '&'`, returning the decoded character and the number of bytes of
/// `input` it consumed. Falls back to a literal `&` (one byte consumed) for
/// anything unrecognized, matching browsers' lenient behavior.
fn decode_entity(input: &str) -> (char, usize) {
    let Some(end) = input.find(';').filter(|&p| p <= 10) else {
        return ('&', 1);
    };
    let body = &input[1..end];
    let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
    } else if let Some(dec) = body.strip_prefix('#') {
        dec.parse::<u32>().ok().and_then(char::from_u32)
    } else {
        match body {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" | "#39" => Some('\''),
            "nbsp" => Some('\u{00A0}'),
            "copy" => Some('\u{00A9}'),
            "reg" => Some('\u{00AE}'),
            "mdash" => Some('\u{2014}'),
            "ndash" => Some('\u{2013}'),
            "hellip" => Some('\u{2026}'),
            _ => None,
        }
    };
    match decoded {
        Some(c) => (c, end + 1),
        None => ('&', 1),
    }
}

/// Wraps plain text into a minimal HTML document, escaping the five
/// characters that are meaningful in HTML and turning newlines into `<br>`.
pub fn text_to_html(input: &str) -> String {
    let mut html = String::with_capacity(input.len() + 32);
    html.push_str("<html><body>\n<p>\n");
    for ch in input.chars() {
        match ch {
            '<' => html.push_str("&lt;"),
            '>' => html.push_str("&gt;"),
            '&' => html.push_str("&amp;"),
            '"' => html.push_str("&quot;"),
            '\'' => html.push_str("&#39;"),
            '\n' => html.push_str("<br/>\n"),
            c => html.push(c),
        }
    }
    html.push_str("\n</p>\n</body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_decodes_entities() {
        let html = "<html><body><p>Hello&nbsp;<b>world</b> &amp; friends</p></body></html>";
        let text = html_to_text(html);
        assert_eq!(text, "Hello\u{00A0}world & friends");
    }

    #[test]
    fn block_tags_become_newlines() {
        let html = "<p>one</p><p>two</p>";
        let text = html_to_text(html);
        assert_eq!(text, "one\ntwo");
    }

    #[test]
    fn script_content_is_dropped() {
        let html = "<p>before</p><script>alert('x')</script><p>after</p>";
        let text = html_to_text(html);
        assert_eq!(text, "before\nafter");
    }

    #[test]
    fn text_to_html_escapes_and_wraps() {
        let html = text_to_html("a < b & c\nsecond line");
        assert!(html.contains("a &lt; b &amp; c"));
        assert!(html.contains("<br/>"));
        assert!(html.starts_with("<html><body>"));
    }
}
