//! Row assembly: fixed text columns followed by a grow-only image region.

use crate::domain::{DecodedImage, Identifier, ImageFormatKind, OutputRecord, ProductFields};
use crate::infrastructure::config::ImageConfig;

/// Largest number of characters a spreadsheet cell holds
pub const MAX_CELL_CHARS: usize = 32_767;

/// First image column (zero-based)
pub const IMAGE_COLUMN_OFFSET: u16 = 5;

/// Text columns in order, with their widths in character units
pub const TEXT_COLUMNS: [(&str, f64); 5] = [
    ("ASIN", 11.0),
    ("Title", 50.0),
    ("Price", 16.0),
    ("Seller", 22.0),
    ("Buybox Status", 18.0),
];

/// Remove control characters a cell cannot store and cap the length
pub fn sanitize_text(value: &str) -> String {
    value
        .chars()
        .filter(|c| {
            !matches!(*c, '\u{0000}'..='\u{0008}' | '\u{000B}' | '\u{000C}' | '\u{000E}'..='\u{001F}')
        })
        .take(MAX_CELL_CHARS)
        .collect()
}

/// Column width (character units) that shows `px` pixels
pub fn pixels_to_col_width(px: u32) -> f64 {
    ((f64::from(px) - 5.0) / 7.0).max(1.0)
}

/// Uniform scale that fits a `width` x `height` image into a square cell without enlarging it
pub fn image_scale(width: u32, height: u32, cell_px: u32) -> f64 {
    if width == 0 || height == 0 {
        return 1.0;
    }
    let cell = f64::from(cell_px);
    (cell / f64::from(width)).min(cell / f64::from(height)).min(1.0)
}

/// Header and width of one sheet column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub column: u16,
    pub header: String,
    pub width: f64,
}

/// Image with its cell placement
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedImage {
    pub column: u16,
    pub bytes: Vec<u8>,
    pub format: ImageFormatKind,
    pub x_scale: f64,
    pub y_scale: f64,
    pub x_offset: u32,
    pub y_offset: u32,
    /// `<IDENTIFIER>_<n>.<ext>`, used when images are exported to disk
    pub export_name: String,
}

/// Fully placed row, ready for a [`SheetSink`](super::sheet_writer::SheetSink)
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// Zero-based sheet row; row 0 is the header
    pub row: u32,
    pub identifier: String,
    pub height_pt: f64,
    pub cells: Vec<String>,
    pub images: Vec<PlacedImage>,
}

/// Columns introduced by the last placed row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnPlanUpdate {
    /// Set for the first row: `added` then holds the whole header
    pub initial: bool,
    pub added: Vec<ColumnSpec>,
}

impl ColumnPlanUpdate {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }
}

/// Builds output records and places them on the sheet
#[derive(Debug, Clone)]
pub struct RowAssembler {
    min_image_columns: u16,
    image_columns: u16,
    cell_size_px: u32,
    image_offset_px: u32,
    row_height_pt: f64,
    next_row: u32,
}

impl RowAssembler {
    pub fn new(min_image_columns: u32, images: &ImageConfig) -> Self {
        Self {
            min_image_columns: u16::try_from(min_image_columns).unwrap_or(u16::MAX),
            image_columns: 0,
            cell_size_px: images.cell_size_px,
            image_offset_px: images.image_offset_px,
            row_height_pt: images.row_height_pt,
            next_row: 1,
        }
    }

    /// Image columns established so far
    pub fn image_columns(&self) -> u16 {
        self.image_columns
    }

    pub fn assemble(
        &self,
        identifier: &Identifier,
        fields: ProductFields,
        images: Vec<DecodedImage>,
    ) -> OutputRecord {
        OutputRecord {
            identifier: identifier.clone(),
            title: sanitize_text(&fields.title),
            price: sanitize_text(&fields.price),
            seller: sanitize_text(&fields.seller),
            buybox_status: fields.buybox,
            images,
        }
    }

    pub fn place(&mut self, record: OutputRecord) -> (SheetRow, ColumnPlanUpdate) {
        let update = self.grow(record.images.len());

        let identifier = record.identifier.as_str().to_string();
        let cells = record
            .text_cells()
            .iter()
            .map(|c| (*c).to_string())
            .collect();

        let images = record
            .images
            .into_iter()
            .take(usize::from(u16::MAX - IMAGE_COLUMN_OFFSET))
            .enumerate()
            .map(|(i, image)| {
                let scale = image_scale(image.width, image.height, self.cell_size_px);
                PlacedImage {
                    column: IMAGE_COLUMN_OFFSET + i as u16,
                    export_name: format!("{}_{}.{}", identifier, i + 1, image.format.extension()),
                    bytes: image.bytes,
                    format: image.format,
                    x_scale: scale,
                    y_scale: scale,
                    x_offset: self.image_offset_px,
                    y_offset: self.image_offset_px,
                }
            })
            .collect();

        let row = SheetRow {
            row: self.next_row,
            identifier,
            height_pt: self.row_height_pt,
            cells,
            images,
        };
        self.next_row += 1;
        (row, update)
    }

    /// Grow the image region to fit `image_count`; never shrinks
    fn grow(&mut self, image_count: usize) -> ColumnPlanUpdate {
        let initial = self.next_row == 1;
        let needed = u16::try_from(image_count)
            .unwrap_or(u16::MAX)
            .min(u16::MAX - IMAGE_COLUMN_OFFSET)
            .max(self.min_image_columns);

        let mut added = Vec::new();
        if initial {
            added.extend(TEXT_COLUMNS.iter().zip(0u16..).map(|((header, width), column)| {
                ColumnSpec {
                    column,
                    header: (*header).to_string(),
                    width: *width,
                }
            }));
        }

        let width = pixels_to_col_width(self.cell_size_px);
        for n in self.image_columns..needed {
            added.push(ColumnSpec {
                column: IMAGE_COLUMN_OFFSET + n,
                header: format!("Image {}", n + 1),
                width,
            });
        }
        self.image_columns = self.image_columns.max(needed);

        ColumnPlanUpdate { initial, added }
    }
}
