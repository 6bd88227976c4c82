use std::cell::RefCell;

use futures::executor::block_on;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use pdf_page_extract_worker::converter::Converter;
use pdf_page_extract_worker::document::ConvertedDocument;
use pdf_page_extract_worker::error::ApiError;
use pdf_page_extract_worker::models::{PAGE_SEPARATOR, ParseRequest, UNKNOWN_PAGE};
use pdf_page_extract_worker::page_query::{PageRange, parse_page_query};
use pdf_page_extract_worker::parse_pipeline::{extract_from_document, parse_document};
use pdf_page_extract_worker::upload_store::{MemoryUploadStore, StoredUpload, UploadStore};

const PAGE_FIVE: &str = "# Annual report\n\n| a | b |\n|---|---|\n| x | y |";
const PAGE_TEN: &str = "Summary paragraph\n\n- Item one\n\n| k | v |\n|---|---|\n| a | 1 |";

fn header_cell(text: &str, col: u32) -> Value {
    json!({
        "text": text,
        "column_header": true,
        "start_row_offset_idx": 0, "end_row_offset_idx": 1,
        "start_col_offset_idx": col, "end_col_offset_idx": col + 1
    })
}

fn body_cell(text: &str, col: u32) -> Value {
    json!({
        "text": text,
        "start_row_offset_idx": 1, "end_row_offset_idx": 2,
        "start_col_offset_idx": col, "end_col_offset_idx": col + 1
    })
}

/// Tables on pages 5 and 10 plus one table without provenance.
fn sample_graph() -> Value {
    json!({
        "body": {"children": [
            {"$ref": "#/texts/0"},
            {"$ref": "#/tables/0"},
            {"$ref": "#/texts/1"},
            {"$ref": "#/groups/0"},
            {"$ref": "#/tables/1"}
        ]},
        "groups": [{"children": [{"$ref": "#/texts/2"}]}],
        "texts": [
            {"label": "title", "text": "Annual report", "prov": [{"page_no": 5}]},
            {"label": "text", "text": "Summary paragraph", "prov": [{"page_no": 10}]},
            {"label": "list_item", "text": "Item one", "prov": [{"page_no": 10}]},
            {"label": "page_footer", "text": "Page 10 of 10", "prov": [{"page_no": 10}]}
        ],
        "tables": [
            {
                "prov": [{"page_no": 5}],
                "data": {
                    "num_rows": 2,
                    "num_cols": 2,
                    "table_cells": [
                        header_cell("a", 0), header_cell("b", 1),
                        body_cell("x", 0), body_cell("y", 1)
                    ]
                }
            },
            {
                "prov": [{"page_no": 10}],
                "data": {"grid": [
                    [{"text": "k", "column_header": true}, {"text": "v", "column_header": true}],
                    [{"text": "a"}, {"text": "1"}]
                ]}
            },
            {"data": {"grid": [[{"text": "orphan"}]]}}
        ],
        "pages": {"5": {"page_no": 5}, "10": {"page_no": 10}}
    })
}

fn sample_document() -> ConvertedDocument {
    ConvertedDocument::new(sample_graph(), Some("FULL DOCUMENT".to_string()))
}

#[test]
fn explicit_page_keeps_only_its_tables() {
    let outcome = extract_from_document(&sample_document(), &parse_page_query("5"));
    let response = outcome.response;

    assert_eq!(response.content, PAGE_FIVE);
    assert_eq!(response.tables.len(), 1);
    assert_eq!(response.tables[0].id, 0);
    assert_eq!(response.tables[0].page, 5);
    assert_eq!(response.tables[0].csv, "a,b\nx,y\n");
    assert!(outcome.warnings.is_empty());
}

#[test]
fn no_filter_keeps_every_table_including_unknown_pages() {
    let outcome = extract_from_document(&sample_document(), &parse_page_query(""));
    let response = outcome.response;

    assert_eq!(response.content, format!("{PAGE_FIVE}{PAGE_SEPARATOR}{PAGE_TEN}"));
    let pages = response
        .tables
        .iter()
        .map(|table| (table.id, table.page))
        .collect::<Vec<_>>();
    assert_eq!(pages, vec![(0, 5), (1, 10), (2, UNKNOWN_PAGE)]);
    assert_eq!(response.tables[1].csv, "k,v\na,1\n");
    assert_eq!(response.tables[1].preview, "| k | v |\n|---|---|\n| a | 1 |");
    assert_eq!(response.tables[2].csv, "0\norphan\n");
}

#[test]
fn unknown_page_tables_are_dropped_under_a_filter() {
    let outcome = extract_from_document(&sample_document(), &parse_page_query("1-100"));
    let ids = outcome
        .response
        .tables
        .iter()
        .map(|table| table.id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![0, 1]);
}

#[test]
fn pages_without_content_fall_back_to_whole_document() {
    let outcome = extract_from_document(&sample_document(), &parse_page_query("page 7"));
    assert_eq!(outcome.response.content, "FULL DOCUMENT");
    assert!(outcome.response.tables.is_empty());
}

#[test]
fn broken_table_is_skipped_with_a_warning() {
    let mut graph = sample_graph();
    graph["tables"][1] = json!({"prov": [{"page_no": 10}], "data": {}});

    let outcome = extract_from_document(
        &ConvertedDocument::new(graph, None),
        &parse_page_query(""),
    );

    let ids = outcome
        .response
        .tables
        .iter()
        .map(|table| table.id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![0, 2]);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].table_id, 1);
}

#[test]
fn list_shaped_pages_and_cell_provenance() {
    let graph = json!({
        "pages": [
            {"page_no": 1, "text": "first page"},
            {"page_no": 2, "text": "second page"}
        ],
        "tables": [
            {"cells": [{"text": "h", "prov": {"page_no": 2}}]},
            {"cells": [{"text": "g", "prov": [{"page_no": 1}]}]}
        ]
    });

    let outcome = extract_from_document(
        &ConvertedDocument::new(graph, None),
        &parse_page_query("page 2"),
    );

    assert_eq!(outcome.response.content, "second page");
    assert_eq!(outcome.response.tables.len(), 1);
    assert_eq!(outcome.response.tables[0].page, 2);
    assert_eq!(outcome.response.tables[0].csv, "0\nh\n");
}

fn table_on(page_no: u32, text: &str) -> Value {
    json!({"prov": [{"page_no": page_no}], "data": {"grid": [[{"text": text}]]}})
}

#[test]
fn provenance_beyond_the_last_page_is_unknown() {
    let graph = json!({
        "pages": {"1": {"page_no": 1}, "2": {"page_no": 2}},
        "tables": [table_on(2, "kept"), table_on(99, "stray")]
    });
    let document = ConvertedDocument::new(graph, Some("TWO PAGES".to_string()));

    let unfiltered = extract_from_document(&document, &parse_page_query("")).response;
    let pages = unfiltered
        .tables
        .iter()
        .map(|table| (table.id, table.page))
        .collect::<Vec<_>>();
    assert_eq!(pages, vec![(0, 2), (1, UNKNOWN_PAGE)]);

    let filtered = extract_from_document(&document, &parse_page_query("99")).response;
    assert!(filtered.tables.is_empty());
    assert_eq!(filtered.content, "TWO PAGES");
}

#[test]
fn sequence_bounds_use_the_largest_page_attribute() {
    let graph = json!({
        "pages": [
            {"page_no": 4, "text": "fourth page"},
            {"page_no": 5, "text": "fifth page"}
        ],
        "tables": [table_on(5, "last"), table_on(6, "past the end"), table_on(1, "first")]
    });
    let document = ConvertedDocument::new(graph, None);

    let outcome = extract_from_document(&document, &parse_page_query(""));
    let pages = outcome
        .response
        .tables
        .iter()
        .map(|table| (table.id, table.page))
        .collect::<Vec<_>>();
    assert_eq!(pages, vec![(0, 5), (1, UNKNOWN_PAGE), (2, 1)]);

    let fifth = extract_from_document(&document, &parse_page_query("5-6")).response;
    assert_eq!(fifth.content, "fifth page");
    assert_eq!(
        fifth.tables.iter().map(|table| table.id).collect::<Vec<_>>(),
        vec![0]
    );
}

#[derive(Default)]
struct RecordingConverter {
    hints: RefCell<Vec<Option<PageRange>>>,
}

impl Converter for RecordingConverter {
    async fn convert(
        &self,
        _source: &StoredUpload,
        page_range: Option<PageRange>,
    ) -> Result<ConvertedDocument, ApiError> {
        self.hints.borrow_mut().push(page_range);
        Ok(sample_document())
    }
}

struct FailingConverter;

impl Converter for FailingConverter {
    async fn convert(
        &self,
        _source: &StoredUpload,
        _page_range: Option<PageRange>,
    ) -> Result<ConvertedDocument, ApiError> {
        Err(ApiError::Upstream("layout model crashed".to_string()))
    }
}

fn request(file_path: &str, page_query: &str) -> ParseRequest {
    ParseRequest {
        file_path: file_path.to_string(),
        page_query: page_query.to_string(),
    }
}

#[test]
fn converter_receives_min_max_hint_only_for_explicit_pages() {
    let store = MemoryUploadStore::new();
    let converter = RecordingConverter::default();
    let uploaded = block_on(store.store(b"%PDF-1.7", "report.pdf")).expect("upload");

    block_on(parse_document(&store, &converter, &request(&uploaded.file_path, "10, 5")))
        .expect("explicit parse");
    block_on(parse_document(&store, &converter, &request(&uploaded.file_path, "")))
        .expect("full parse");

    assert_eq!(
        *converter.hints.borrow(),
        vec![Some(PageRange { start: 5, end: 10 }), None]
    );
}

#[test]
fn missing_upload_is_not_found() {
    let store = MemoryUploadStore::new();
    let uploaded = block_on(store.store(b"%PDF-1.7", "gone.pdf")).expect("upload");
    assert!(store.remove(&uploaded.file_path));

    let error = block_on(parse_document(
        &store,
        &RecordingConverter::default(),
        &request(&uploaded.file_path, "1"),
    ))
    .expect_err("deleted upload should not resolve");

    assert_eq!(error.status_code(), 404);
    assert_eq!(error.message(), "File not found");
}

#[test]
fn conversion_failure_is_internal_error_with_message() {
    let store = MemoryUploadStore::new();
    let uploaded = block_on(store.store(b"%PDF-1.7", "report.pdf")).expect("upload");

    let error = block_on(parse_document(
        &store,
        &FailingConverter,
        &request(&uploaded.file_path, "1-3"),
    ))
    .expect_err("conversion should fail");

    assert_eq!(error.status_code(), 500);
    assert_eq!(error.error_body().message, "layout model crashed");
}
