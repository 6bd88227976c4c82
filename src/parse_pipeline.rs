use crate::converter::Converter;
use crate::document::{ConvertedDocument, DocumentView, TableView};
use crate::error::ApiError;
use crate::models::{
    ExtractedTable, PAGE_SEPARATOR, PREVIEW_ROWS, ParseRequest, ParseResponse, UNKNOWN_PAGE,
};
use crate::page_query::{PageQuery, parse_page_query};
use crate::table_export::{preview, write_csv_to_string};
use crate::upload_store::UploadStore;

/// A table dropped from the response because it could not be exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub table_id: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub response: ParseResponse,
    pub warnings: Vec<ParseWarning>,
}

/// Resolves the upload, converts it (bounded by the query's page range) and
/// keeps only the requested pages and tables.
pub async fn parse_document<S, C>(
    store: &S,
    converter: &C,
    request: &ParseRequest,
) -> Result<ParseOutcome, ApiError>
where
    S: UploadStore,
    C: Converter,
{
    let source = store
        .load(&request.file_path)
        .await?
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;

    let query = parse_page_query(&request.page_query);
    let document = converter
        .convert(&source, query.page_range_hint())
        .await
        .map_err(ApiError::into_internal)?;

    Ok(extract_from_document(&document, &query))
}

pub fn extract_from_document(document: &ConvertedDocument, query: &PageQuery) -> ParseOutcome {
    let view = DocumentView::new(document);
    let page_texts = collect_page_texts(&view, query);
    let (tables, warnings) = collect_tables(&view, query);

    let content = if page_texts.is_empty() {
        view.markdown()
    } else {
        page_texts.join(PAGE_SEPARATOR)
    };

    ParseOutcome {
        response: ParseResponse { content, tables },
        warnings,
    }
}

fn collect_page_texts(view: &DocumentView<'_>, query: &PageQuery) -> Vec<String> {
    let pages = match query {
        PageQuery::All => view.pages(),
        PageQuery::Pages(pages) => pages.iter().filter_map(|page| view.page(*page)).collect(),
    };

    pages
        .iter()
        .filter_map(|page| page.text())
        .map(str::to_string)
        .collect()
}

fn collect_tables(
    view: &DocumentView<'_>,
    query: &PageQuery,
) -> (Vec<ExtractedTable>, Vec<ParseWarning>) {
    let mut tables = Vec::new();
    let mut warnings = Vec::new();

    for table in view.tables() {
        let page = table.page_number().filter(|page| view.contains_page(*page));
        let selected = match page {
            Some(page) => query.contains(page),
            None => query.is_all(),
        };
        if !selected {
            continue;
        }

        match export_table(&table, page) {
            Ok(extracted) => tables.push(extracted),
            Err(error) => warnings.push(ParseWarning {
                table_id: table.index(),
                message: error.message().to_string(),
            }),
        }
    }

    (tables, warnings)
}

fn export_table(table: &TableView<'_>, page: Option<u32>) -> Result<ExtractedTable, ApiError> {
    let grid = table.rows()?;
    Ok(ExtractedTable {
        id: table.index(),
        page: page.map_or(UNKNOWN_PAGE, i64::from),
        csv: write_csv_to_string(&grid)?,
        preview: preview(&grid, PREVIEW_ROWS),
    })
}
