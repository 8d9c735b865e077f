//! HTML rendering for the gallery page.
//!
//! One static page, no scripts: a filter form, a thumbnail grid, and
//! pagination links that carry the active filters along.

use std::fmt::Write;

use crate::gallery::{GalleryPage, GalleryQuery, SortBy, SortOrder};

const STYLE: &str = "\
body{font-family:sans-serif;margin:1.5rem;background:#fafafa;color:#222}\
form{margin-bottom:1rem}\
form label{margin-right:.75rem}\
.grid{display:grid;grid-template-columns:repeat(auto-fill,minmax(240px,1fr));gap:1rem}\
figure{margin:0;background:#fff;border:1px solid #ddd;border-radius:4px;padding:.5rem}\
figure img{width:100%;height:auto;display:block}\
figcaption{font-size:.8rem;color:#555;margin-top:.4rem}\
nav{margin-top:1.25rem}\
nav a,nav span{margin-right:.75rem}";

pub fn render_gallery(page: &GalleryPage, query: &GalleryQuery) -> String {
    let mut doc = String::with_capacity(4096);
    doc.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
    doc.push_str("<title>camsink gallery</title>");
    let _ = write!(doc, "<style>{STYLE}</style>");
    doc.push_str("</head><body>");

    let _ = write!(
        doc,
        "<h1>camsink gallery</h1><p>{} image{}</p>",
        page.total_images,
        if page.total_images == 1 { "" } else { "s" }
    );

    render_filter_form(&mut doc, page, query);
    render_grid(&mut doc, page);
    render_pagination(&mut doc, page, query);

    doc.push_str("</body></html>");
    doc
}

fn render_filter_form(doc: &mut String, page: &GalleryPage, query: &GalleryQuery) {
    doc.push_str("<form method=\"get\" action=\"/\">");

    doc.push_str("<label>Sender <select name=\"filter_mac\"><option value=\"\">all</option>");
    let active_mac = query.filter_mac.as_deref().unwrap_or("");
    for mac in &page.available_macs {
        let text = mac.to_string();
        let selected = if text == active_mac { " selected" } else { "" };
        let _ = write!(doc, "<option value=\"{text}\"{selected}>{text}</option>");
    }
    doc.push_str("</select></label>");

    let _ = write!(
        doc,
        "<label>Date <input type=\"date\" name=\"filter_date\" value=\"{}\"></label>",
        escape(query.filter_date.as_deref().unwrap_or(""))
    );

    let _ = write!(
        doc,
        "<label>Sort <select name=\"sort_by\">\
         <option value=\"timestamp\"{}>time</option>\
         <option value=\"mac\"{}>sender</option>\
         </select></label>",
        selected(query.sort_by == SortBy::Timestamp),
        selected(query.sort_by == SortBy::Mac),
    );
    let _ = write!(
        doc,
        "<label><select name=\"sort_order\">\
         <option value=\"desc\"{}>newest first</option>\
         <option value=\"asc\"{}>oldest first</option>\
         </select></label>",
        selected(query.sort_order == SortOrder::Desc),
        selected(query.sort_order == SortOrder::Asc),
    );

    let _ = write!(
        doc,
        "<input type=\"hidden\" name=\"limit\" value=\"{}\">",
        page.limit
    );
    doc.push_str("<button type=\"submit\">Apply</button></form>");
}

fn render_grid(doc: &mut String, page: &GalleryPage) {
    doc.push_str("<div class=\"grid\">");
    for entry in &page.entries {
        // Entry filenames passed the convention parser, so they are safe
        // to embed verbatim in URLs and markup.
        let _ = write!(
            doc,
            "<figure><a href=\"/images/{name}\">\
             <img src=\"/images/{name}\" loading=\"lazy\" alt=\"{mac}\">\
             </a><figcaption>{mac}<br>{time}</figcaption></figure>",
            name = entry.filename,
            mac = entry.mac,
            time = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
        );
    }
    doc.push_str("</div>");
}

fn render_pagination(doc: &mut String, page: &GalleryPage, query: &GalleryQuery) {
    doc.push_str("<nav>");
    if page.page > 1 {
        let _ = write!(
            doc,
            "<a href=\"{}\">&laquo; previous</a>",
            page_href(query, page, page.page - 1)
        );
    }
    let _ = write!(doc, "<span>page {} / {}</span>", page.page, page.total_pages);
    if page.page < page.total_pages {
        let _ = write!(
            doc,
            "<a href=\"{}\">next &raquo;</a>",
            page_href(query, page, page.page + 1)
        );
    }
    doc.push_str("</nav>");
}

fn page_href(query: &GalleryQuery, page: &GalleryPage, target: usize) -> String {
    let mut href = format!("/?page={target}&limit={}", page.limit);
    if let Some(mac) = query.filter_mac.as_deref().filter(|s| !s.is_empty()) {
        let _ = write!(href, "&filter_mac={}", escape(mac));
    }
    if let Some(date) = query.filter_date.as_deref().filter(|s| !s.is_empty()) {
        let _ = write!(href, "&filter_date={}", escape(date));
    }
    let sort_by = match query.sort_by {
        SortBy::Timestamp => "timestamp",
        SortBy::Mac => "mac",
    };
    let sort_order = match query.sort_order {
        SortOrder::Asc => "asc",
        SortOrder::Desc => "desc",
    };
    let _ = write!(href, "&sort_by={sort_by}&sort_order={sort_order}");
    href
}

fn selected(active: bool) -> &'static str {
    if active { " selected" } else { "" }
}

/// Minimal HTML escaping for values echoed back from the query string.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::{GalleryEntry, build_page};
    use camsink_receiver::{ImageFilename, Mac};
    use chrono::NaiveDateTime;

    fn page_with_one_image() -> GalleryPage {
        let mac: Mac = "34:ab:95:fa:3a:6c".parse().unwrap();
        let timestamp =
            NaiveDateTime::parse_from_str("2025-04-14 11:55:21", "%Y-%m-%d %H:%M:%S").unwrap();
        let entry = GalleryEntry {
            filename: ImageFilename::new(mac, timestamp).to_string(),
            mac,
            timestamp,
        };
        build_page(vec![entry], &GalleryQuery::default())
    }

    #[test]
    fn gallery_links_to_the_blob_route() {
        let html = render_gallery(&page_with_one_image(), &GalleryQuery::default());
        assert!(html.contains("/images/34ab95fa3a6c_20250414_115521_000000.jpg"));
        assert!(html.contains("34:ab:95:fa:3a:6c"));
    }

    #[test]
    fn echoed_filters_are_escaped() {
        let query = GalleryQuery {
            filter_date: Some("\"><script>".into()),
            ..GalleryQuery::default()
        };
        let html = render_gallery(&page_with_one_image(), &query);
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn pagination_preserves_filters() {
        let mac: Mac = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let entries: Vec<GalleryEntry> = (0..5)
            .map(|i| {
                let timestamp = NaiveDateTime::parse_from_str(
                    &format!("2025-04-14 11:55:{i:02}"),
                    "%Y-%m-%d %H:%M:%S",
                )
                .unwrap();
                GalleryEntry {
                    filename: ImageFilename::new(mac, timestamp).to_string(),
                    mac,
                    timestamp,
                }
            })
            .collect();
        let query = GalleryQuery {
            limit: 2,
            filter_mac: Some("aa:bb:cc:dd:ee:ff".into()),
            ..GalleryQuery::default()
        };
        let page = build_page(entries, &query);
        let html = render_gallery(&page, &query);
        assert!(html.contains("page=2"));
        assert!(html.contains("filter_mac=aa:bb:cc:dd:ee:ff"));
    }
}
