//! Gallery listing: scan the image directory, filter, sort, paginate.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::{debug, warn};

use camsink_receiver::{ImageFilename, Mac};

use crate::ViewerState;
use crate::html;

/// Images shown per page when the request does not say.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Hard ceiling on images per page.
pub const MAX_PAGE_SIZE: usize = 200;

/// Query parameters of the gallery page.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GalleryQuery {
    pub page: usize,
    pub limit: usize,
    pub filter_mac: Option<String>,
    pub filter_date: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl Default for GalleryQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            filter_mac: None,
            filter_date: None,
            sort_by: SortBy::Timestamp,
            sort_order: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Timestamp,
    Mac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One image file whose name parsed under the receiver's convention.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub filename: String,
    pub mac: Mac,
    pub timestamp: NaiveDateTime,
}

/// One rendered page of the gallery.
#[derive(Debug)]
pub struct GalleryPage {
    pub entries: Vec<GalleryEntry>,
    pub page: usize,
    pub total_pages: usize,
    pub total_images: usize,
    pub limit: usize,
    /// Every sender seen in the directory, for the filter drop-down.
    pub available_macs: Vec<Mac>,
}

/// List the directory, keeping only files that conform to the filename
/// convention.
pub async fn scan_dir(dir: &Path) -> std::io::Result<Vec<GalleryEntry>> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(dir).await?;
    while let Some(dirent) = reader.next_entry().await? {
        let name = dirent.file_name();
        let Some(name) = name.to_str() else { continue };
        match ImageFilename::parse(name) {
            Some(parsed) => entries.push(GalleryEntry {
                filename: name.to_string(),
                mac: parsed.mac,
                timestamp: parsed.timestamp,
            }),
            None => debug!(file = name, "Skipping file outside the naming convention"),
        }
    }
    Ok(entries)
}

/// Apply filters, sorting, and pagination to the scanned entries.
///
/// Unparsable filter values are ignored rather than erroring: the gallery
/// is a convenience view, and a bad query should show everything instead
/// of nothing.
pub fn build_page(mut entries: Vec<GalleryEntry>, query: &GalleryQuery) -> GalleryPage {
    let available_macs: Vec<Mac> = entries
        .iter()
        .map(|entry| entry.mac)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if let Some(filter) = query.filter_mac.as_deref().filter(|s| !s.is_empty()) {
        match filter.parse::<Mac>() {
            Ok(mac) => entries.retain(|entry| entry.mac == mac),
            Err(_) => warn!(filter, "Ignoring unparsable MAC filter"),
        }
    }
    if let Some(filter) = query.filter_date.as_deref().filter(|s| !s.is_empty()) {
        match NaiveDate::parse_from_str(filter, "%Y-%m-%d") {
            Ok(date) => entries.retain(|entry| entry.timestamp.date() == date),
            Err(_) => warn!(filter, "Ignoring unparsable date filter"),
        }
    }

    match query.sort_by {
        SortBy::Timestamp => entries.sort_by_key(|entry| entry.timestamp),
        SortBy::Mac => entries.sort_by_key(|entry| entry.mac),
    }
    if query.sort_order == SortOrder::Desc {
        entries.reverse();
    }

    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let total_images = entries.len();
    let total_pages = total_images.div_ceil(limit).max(1);
    let page = query.page.clamp(1, total_pages);
    let entries = entries
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();

    GalleryPage {
        entries,
        page,
        total_pages,
        total_images,
        limit,
        available_macs,
    }
}

/// `GET /` — the paginated gallery page.
pub async fn index(
    State(state): State<Arc<ViewerState>>,
    Query(query): Query<GalleryQuery>,
) -> Response {
    match scan_dir(&state.image_dir).await {
        Ok(entries) => {
            let page = build_page(entries, &query);
            Html(html::render_gallery(&page, &query)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to list image directory");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to list image directory",
            )
                .into_response()
        }
    }
}

/// `GET /images/{filename}` — the raw blob.
///
/// Only names that parse under the filename convention are served, which
/// also forecloses path traversal.
pub async fn image(
    State(state): State<Arc<ViewerState>>,
    UrlPath(filename): UrlPath<String>,
) -> Response {
    if ImageFilename::parse(&filename).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let path = state.image_dir.join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
        Err(e) => {
            debug!(file = %filename, error = %e, "Image not readable");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn entry(mac: &str, timestamp: &str) -> GalleryEntry {
        let mac: Mac = mac.parse().unwrap();
        let timestamp =
            NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S").unwrap();
        GalleryEntry {
            filename: ImageFilename::new(mac, timestamp).to_string(),
            mac,
            timestamp,
        }
    }

    fn sample_entries() -> Vec<GalleryEntry> {
        vec![
            entry("aa:bb:cc:dd:ee:ff", "2025-04-14 11:55:21"),
            entry("00:11:22:33:44:55", "2025-04-14 09:00:00"),
            entry("aa:bb:cc:dd:ee:ff", "2025-04-15 08:30:00"),
            entry("00:11:22:33:44:55", "2025-04-16 20:15:45"),
        ]
    }

    fn query() -> GalleryQuery {
        GalleryQuery::default()
    }

    #[test]
    fn default_sort_is_newest_first() {
        let page = build_page(sample_entries(), &query());
        let timestamps: Vec<_> = page.entries.iter().map(|e| e.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        sorted.reverse();
        assert_eq!(timestamps, sorted);
        assert_eq!(page.total_images, 4);
    }

    #[test]
    fn sorts_ascending_by_mac() {
        let page = build_page(
            sample_entries(),
            &GalleryQuery {
                sort_by: SortBy::Mac,
                sort_order: SortOrder::Asc,
                ..query()
            },
        );
        let macs: Vec<_> = page.entries.iter().map(|e| e.mac).collect();
        let mut sorted = macs.clone();
        sorted.sort();
        assert_eq!(macs, sorted);
    }

    #[test]
    fn filters_by_mac() {
        let page = build_page(
            sample_entries(),
            &GalleryQuery {
                filter_mac: Some("aa:bb:cc:dd:ee:ff".into()),
                ..query()
            },
        );
        assert_eq!(page.total_images, 2);
        assert!(
            page.entries
                .iter()
                .all(|e| e.mac == "aa:bb:cc:dd:ee:ff".parse().unwrap())
        );
        // The drop-down still offers every sender.
        assert_eq!(page.available_macs.len(), 2);
    }

    #[test]
    fn filters_by_date() {
        let page = build_page(
            sample_entries(),
            &GalleryQuery {
                filter_date: Some("2025-04-14".into()),
                ..query()
            },
        );
        assert_eq!(page.total_images, 2);
    }

    #[test_case("not-a-mac"; "bad mac")]
    #[test_case("14/04/2025"; "bad date goes to mac filter too")]
    fn unparsable_mac_filter_shows_everything(filter: &str) {
        let page = build_page(
            sample_entries(),
            &GalleryQuery {
                filter_mac: Some(filter.into()),
                ..query()
            },
        );
        assert_eq!(page.total_images, 4);
    }

    #[test]
    fn unparsable_date_filter_shows_everything() {
        let page = build_page(
            sample_entries(),
            &GalleryQuery {
                filter_date: Some("yesterday".into()),
                ..query()
            },
        );
        assert_eq!(page.total_images, 4);
    }

    #[test]
    fn paginates_and_clamps() {
        let entries: Vec<GalleryEntry> = (0..7)
            .map(|i| entry("aa:bb:cc:dd:ee:ff", &format!("2025-04-14 11:00:{i:02}")))
            .collect();

        let page = build_page(
            entries.clone(),
            &GalleryQuery {
                limit: 3,
                page: 2,
                sort_order: SortOrder::Asc,
                ..query()
            },
        );
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.entries.len(), 3);
        assert_eq!(page.entries[0].timestamp.and_utc().timestamp() % 60, 3);

        // A page past the end clamps to the last page.
        let last = build_page(
            entries.clone(),
            &GalleryQuery {
                limit: 3,
                page: 99,
                sort_order: SortOrder::Asc,
                ..query()
            },
        );
        assert_eq!(last.page, 3);
        assert_eq!(last.entries.len(), 1);

        // Limit zero is bumped to one instead of dividing by zero.
        let narrow = build_page(entries, &GalleryQuery { limit: 0, ..query() });
        assert_eq!(narrow.limit, 1);
        assert_eq!(narrow.total_pages, 7);
    }

    #[test]
    fn empty_directory_is_one_empty_page() {
        let page = build_page(Vec::new(), &query());
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.page, 1);
        assert!(page.entries.is_empty());
        assert!(page.available_macs.is_empty());
    }

    #[tokio::test]
    async fn scan_skips_nonconforming_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("34ab95fa3a6c_20250414_115521_331015.jpg"),
            b"jpeg",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();
        std::fs::write(dir.path().join("screenshot.jpg"), b"wrong name").unwrap();

        let entries = scan_dir(dir.path()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].filename,
            "34ab95fa3a6c_20250414_115521_331015.jpg"
        );
    }
}
