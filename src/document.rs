//! Adapter over the converter's document graph.
//!
//! The converter's JSON output is not stable across versions: the page
//! collection may be a list of objects, a mapping keyed by page number, or
//! missing, and provenance may sit on the item itself or on its first cell.
//! All of that shape sniffing happens here; the rest of the crate only sees
//! [`DocumentView`], [`PageView`] and [`TableView`].

use serde_json::Value;

use crate::error::ApiError;
use crate::table_export::{TableGrid, markdown_table};

const PAGE_NUMBER_FIELDS: [&str; 3] = ["page_no", "page", "page_number"];
const PAGE_TEXT_FIELDS: [&str; 3] = ["markdown", "md_content", "text"];
const CELL_COLLECTION_POINTERS: [&str; 3] = ["/cells", "/table_cells", "/data/table_cells"];
const MAX_TREE_DEPTH: usize = 64;
const MAX_GRID_ROWS: usize = 20_000;
const MAX_GRID_COLS: usize = 1_000;
const MAX_GRID_CELLS: usize = 1_000_000;

/// Result of one conversion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedDocument {
    pub graph: Value,
    /// Whole-document markdown export, when the converter produced one.
    pub markdown: Option<String>,
}

impl ConvertedDocument {
    pub fn new(graph: Value, markdown: Option<String>) -> Self {
        Self { graph, markdown }
    }
}

/// Reads a page number from the first matching field of `item`.
pub fn page_field(item: &Value) -> Option<u32> {
    PAGE_NUMBER_FIELDS
        .iter()
        .find_map(|field| item.get(*field))
        .and_then(value_as_page)
}

fn value_as_page(value: &Value) -> Option<u32> {
    let page = match value {
        Value::Number(number) => number.as_u64()?,
        Value::String(text) => text.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    u32::try_from(page).ok().filter(|page| *page > 0)
}

/// Resolves the page an item (text, table, or page object) belongs to.
///
/// Tries the item's own provenance list first, then the provenance of its
/// first sub-cell, which may be a single object or a list. `None` means the
/// page is unknown.
pub fn page_number_of(item: &Value) -> Option<u32> {
    if let Some(page) = item.get("prov").and_then(provenance_page) {
        return Some(page);
    }

    CELL_COLLECTION_POINTERS
        .iter()
        .find_map(|pointer| item.pointer(pointer).and_then(Value::as_array))
        .and_then(|cells| cells.first())
        .and_then(|cell| cell.get("prov"))
        .and_then(provenance_page)
}

fn provenance_page(provenance: &Value) -> Option<u32> {
    match provenance {
        Value::Array(entries) => entries.iter().find_map(page_field),
        Value::Object(_) => page_field(provenance),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    number: Option<u32>,
    text: Option<String>,
}

impl PageView {
    pub fn page_number(&self) -> Option<u32> {
        self.number
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableView<'a> {
    index: usize,
    item: &'a Value,
}

impl<'a> TableView<'a> {
    pub fn new(index: usize, item: &'a Value) -> Self {
        Self { index, item }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn page_number(&self) -> Option<u32> {
        page_number_of(self.item)
    }

    /// Materializes the table as a cell grid.
    ///
    /// Looks for `data.grid`, then `data.table_cells`, then a top-level `grid`
    /// or `cells` collection.
    pub fn rows(&self) -> Result<TableGrid, ApiError> {
        let cells = if let Some(grid) = self.item.pointer("/data/grid").and_then(grid_from_rows) {
            grid
        } else if let Some(cells) = self.item.pointer("/data/table_cells") {
            grid_from_cells(cells, self.item.get("data"))?
        } else if let Some(grid) = self.item.get("grid").and_then(grid_from_rows) {
            grid
        } else if let Some(cells) = self.item.get("cells") {
            grid_from_cells(cells, Some(self.item))?
        } else {
            return Err(ApiError::Internal(format!(
                "table {} has no cell grid",
                self.index
            )));
        };

        if cells.first().is_none_or(Vec::is_empty) {
            return Err(ApiError::Internal(format!(
                "table {} has an empty cell grid",
                self.index
            )));
        }
        Ok(split_header(cells))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct GridCell {
    text: String,
    column_header: bool,
}

impl GridCell {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::String(text) => Self {
                text: text.clone(),
                column_header: false,
            },
            Value::Object(_) => Self {
                text: value
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                column_header: value
                    .get("column_header")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            Value::Null => Self::default(),
            other => Self {
                text: other.to_string(),
                column_header: false,
            },
        }
    }
}

fn grid_from_rows(value: &Value) -> Option<Vec<Vec<GridCell>>> {
    let rows = value.as_array()?;
    let grid = rows
        .iter()
        .map(|row| {
            row.as_array()
                .map(|cells| cells.iter().map(GridCell::from_value).collect::<Vec<_>>())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>();
    let grid = pad_rows(grid);
    (!grid.is_empty()).then_some(grid)
}

fn grid_from_cells(
    cells: &Value,
    dimensions: Option<&Value>,
) -> Result<Vec<Vec<GridCell>>, ApiError> {
    let cells = cells
        .as_array()
        .ok_or_else(|| ApiError::Internal("table cells are not a list".to_string()))?;

    let mut placed = Vec::with_capacity(cells.len());
    for cell in cells {
        let row_start = offset(cell, &["start_row_offset_idx", "row"]).unwrap_or(0);
        let col_start = offset(cell, &["start_col_offset_idx", "col"]).unwrap_or(0);
        let row_end = offset(cell, &["end_row_offset_idx"])
            .unwrap_or_default()
            .max(row_start.saturating_add(1));
        let col_end = offset(cell, &["end_col_offset_idx"])
            .unwrap_or_default()
            .max(col_start.saturating_add(1));
        placed.push((
            row_start..row_end,
            col_start..col_end,
            GridCell::from_value(cell),
        ));
    }

    let declared = |field: &str| {
        dimensions
            .and_then(|value| value.get(field))
            .and_then(Value::as_u64)
            .and_then(|count| usize::try_from(count).ok())
            .unwrap_or(0)
    };
    let num_rows = placed
        .iter()
        .map(|(rows, _, _)| rows.end)
        .max()
        .unwrap_or(0)
        .max(declared("num_rows"));
    let num_cols = placed
        .iter()
        .map(|(_, cols, _)| cols.end)
        .max()
        .unwrap_or(0)
        .max(declared("num_cols"));

    let area = num_rows.checked_mul(num_cols);
    if num_rows > MAX_GRID_ROWS
        || num_cols > MAX_GRID_COLS
        || area.is_none_or(|area| area > MAX_GRID_CELLS)
    {
        return Err(ApiError::Internal(format!(
            "table grid of {num_rows}x{num_cols} cells exceeds limits"
        )));
    }

    let mut grid = vec![vec![GridCell::default(); num_cols]; num_rows];
    for (rows, cols, cell) in placed {
        for row in rows {
            for col in cols.clone() {
                grid[row][col] = cell.clone();
            }
        }
    }
    Ok(grid)
}

fn offset(cell: &Value, fields: &[&str]) -> Option<usize> {
    fields
        .iter()
        .find_map(|field| cell.get(*field))
        .and_then(Value::as_u64)
        .and_then(|value| usize::try_from(value).ok())
}

fn pad_rows(mut grid: Vec<Vec<GridCell>>) -> Vec<Vec<GridCell>> {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut grid {
        row.resize(width, GridCell::default());
    }
    grid.retain(|row| !row.is_empty());
    grid
}

fn split_header(mut cells: Vec<Vec<GridCell>>) -> TableGrid {
    let has_header_row = cells
        .first()
        .is_some_and(|row| row.iter().any(|cell| cell.column_header));
    let width = cells.first().map_or(0, Vec::len);

    let header = if has_header_row {
        cells
            .remove(0)
            .into_iter()
            .map(|cell| cell.text)
            .collect::<Vec<_>>()
    } else {
        (0..width).map(|index| index.to_string()).collect()
    };
    let rows = cells
        .into_iter()
        .map(|row| row.into_iter().map(|cell| cell.text).collect())
        .collect();

    TableGrid { header, rows }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    page: Option<u32>,
    markdown: String,
}

enum PageCollection<'a> {
    Keyed(Vec<(u32, &'a Value)>),
    Sequence(&'a [Value]),
    Absent,
}

pub struct DocumentView<'a> {
    document: &'a ConvertedDocument,
    pages: PageCollection<'a>,
    blocks: Vec<Block>,
}

impl<'a> DocumentView<'a> {
    pub fn new(document: &'a ConvertedDocument) -> Self {
        let pages = match document.graph.get("pages") {
            Some(Value::Object(map)) => {
                let mut keyed = map
                    .iter()
                    .filter_map(|(key, page)| {
                        key.trim()
                            .parse::<u32>()
                            .ok()
                            .filter(|number| *number > 0)
                            .or_else(|| page_field(page))
                            .map(|number| (number, page))
                    })
                    .collect::<Vec<_>>();
                keyed.sort_by_key(|(number, _)| *number);
                PageCollection::Keyed(keyed)
            }
            Some(Value::Array(items)) => PageCollection::Sequence(items),
            _ => PageCollection::Absent,
        };

        let mut view = Self {
            document,
            pages,
            blocks: Vec::new(),
        };
        view.blocks = view.collect_blocks();
        view
    }

    pub fn page_count(&self) -> usize {
        match &self.pages {
            PageCollection::Keyed(pages) => pages.len(),
            PageCollection::Sequence(items) => items.len(),
            PageCollection::Absent => 0,
        }
    }

    /// Every page in natural order.
    pub fn pages(&self) -> Vec<PageView> {
        match &self.pages {
            PageCollection::Keyed(pages) => pages
                .iter()
                .map(|(number, item)| self.page_view(Some(*number), item))
                .collect(),
            PageCollection::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    let number = page_field(item).or_else(|| u32::try_from(index + 1).ok());
                    self.page_view(number, item)
                })
                .collect(),
            PageCollection::Absent => Vec::new(),
        }
    }

    /// Looks up one page by its 1-based number.
    ///
    /// Sequences are searched by each element's own page number before
    /// falling back to `index == page_no - 1`.
    pub fn page(&self, page_no: u32) -> Option<PageView> {
        match &self.pages {
            PageCollection::Keyed(pages) => pages
                .iter()
                .find(|(number, _)| *number == page_no)
                .map(|(number, item)| self.page_view(Some(*number), item)),
            PageCollection::Sequence(items) => items
                .iter()
                .find(|item| page_field(item) == Some(page_no))
                .or_else(|| {
                    let index = usize::try_from(page_no).ok()?.checked_sub(1)?;
                    items.get(index)
                })
                .map(|item| self.page_view(Some(page_no), item)),
            PageCollection::Absent => None,
        }
    }

    pub fn tables(&self) -> Vec<TableView<'a>> {
        self.document
            .graph
            .get("tables")
            .and_then(Value::as_array)
            .map(|tables| {
                tables
                    .iter()
                    .enumerate()
                    .map(|(index, item)| TableView::new(index, item))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `page` lies within the document's page collection.
    pub fn contains_page(&self, page: u32) -> bool {
        let last = match &self.pages {
            PageCollection::Keyed(pages) => pages.last().map(|(number, _)| *number),
            PageCollection::Sequence(items) => {
                let by_field = items.iter().filter_map(page_field).max();
                let by_index = u32::try_from(items.len()).ok();
                by_field.max(by_index)
            }
            PageCollection::Absent => return page > 0,
        };
        page > 0 && last.is_some_and(|last| page <= last)
    }

    /// Whole-document markdown: the converter's own export when present,
    /// otherwise every body block in reading order.
    pub fn markdown(&self) -> String {
        if let Some(markdown) = self
            .document
            .markdown
            .as_deref()
            .filter(|markdown| !markdown.trim().is_empty())
        {
            return markdown.to_string();
        }

        self.blocks
            .iter()
            .map(|block| block.markdown.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn page_view(&self, number: Option<u32>, item: &Value) -> PageView {
        let own_text = PAGE_TEXT_FIELDS
            .iter()
            .find_map(|field| item.get(*field).and_then(Value::as_str))
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string);

        let text = own_text.or_else(|| {
            let number = number?;
            let parts = self
                .blocks
                .iter()
                .filter(|block| block.page == Some(number))
                .map(|block| block.markdown.as_str())
                .collect::<Vec<_>>();
            (!parts.is_empty()).then(|| parts.join("\n\n"))
        });

        PageView { number, text }
    }

    fn collect_blocks(&self) -> Vec<Block> {
        let graph = &self.document.graph;
        let mut blocks = Vec::new();

        if let Some(children) = graph.pointer("/body/children").and_then(Value::as_array) {
            for child in children {
                self.visit(child, 0, &mut blocks);
            }
            return blocks;
        }

        if let Some(texts) = graph.get("texts").and_then(Value::as_array) {
            blocks.extend(texts.iter().filter_map(text_block));
        }
        for table in self.tables() {
            blocks.extend(table_block(&table));
        }
        blocks
    }

    fn visit(&self, node: &Value, depth: usize, blocks: &mut Vec<Block>) {
        if depth > MAX_TREE_DEPTH {
            return;
        }
        let Some(reference) = node.get("$ref").and_then(Value::as_str) else {
            return;
        };
        let pointer = reference.trim_start_matches('#');
        let Some(item) = self.document.graph.pointer(pointer) else {
            return;
        };

        if pointer.starts_with("/tables/") {
            let index = pointer
                .rsplit('/')
                .next()
                .and_then(|index| index.parse::<usize>().ok())
                .unwrap_or_default();
            blocks.extend(table_block(&TableView::new(index, item)));
            return;
        }
        if pointer.starts_with("/texts/") {
            blocks.extend(text_block(item));
        }

        if let Some(children) = item.get("children").and_then(Value::as_array) {
            for child in children {
                self.visit(child, depth + 1, blocks);
            }
        }
    }
}

fn text_block(item: &Value) -> Option<Block> {
    if item.get("content_layer").and_then(Value::as_str) == Some("furniture") {
        return None;
    }
    let label = item.get("label").and_then(Value::as_str).unwrap_or("text");
    if matches!(label, "page_header" | "page_footer") {
        return None;
    }
    let text = item.get("text").and_then(Value::as_str)?.trim();
    if text.is_empty() {
        return None;
    }

    let markdown = match label {
        "title" => format!("# {text}"),
        "section_header" => format!("## {text}"),
        "list_item" => format!("- {text}"),
        "code" => format!("```\n{text}\n```"),
        "formula" => format!("$${text}$$"),
        _ => text.to_string(),
    };
    Some(Block {
        page: page_number_of(item),
        markdown,
    })
}

fn table_block(table: &TableView<'_>) -> Option<Block> {
    let grid = table.rows().ok()?;
    Some(Block {
        page: table.page_number(),
        markdown: markdown_table(&grid.header, &grid.rows),
    })
}
