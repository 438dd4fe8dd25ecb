use std::io::{BufWriter, Cursor};

use anyhow::Context;
use printpdf::image_crate::ImageDecoder;
use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference,
};

use crate::report::{DISCLAIMER, ReportData};

const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const LEFT: Mm = Mm(20.0);
const TOP: Mm = Mm(277.0);
const LINE: Mm = Mm(10.0);
const IMAGE_MAX_WIDTH_MM: f32 = 180.0;
const IMAGE_MAX_HEIGHT_MM: f32 = 220.0;
const DISCLAIMER_WRAP: usize = 90;

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

/// Render a three-page PDF: findings, the annotated scan, and the disclaimer.
pub fn assemble_pdf(data: &ReportData, image_png: Option<&[u8]>) -> anyhow::Result<Vec<u8>> {
    let (doc, page1, layer1) =
        PdfDocument::new("Brain Tumor Detection Report", PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
    let fonts = Fonts {
        regular: doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| anyhow::anyhow!("PDF font error: {e}"))?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| anyhow::anyhow!("PDF font error: {e}"))?,
        italic: doc
            .add_builtin_font(BuiltinFont::HelveticaOblique)
            .map_err(|e| anyhow::anyhow!("PDF font error: {e}"))?,
    };

    // Findings
    let layer = doc.get_page(page1).get_layer(layer1);
    let mut y = TOP;
    layer.use_text("Brain Tumor Detection Report", 16.0, Mm(55.0), y, &fonts.bold);
    y -= LINE * 2.0;

    layer.use_text(format!("Patient: {}", data.patient_name), 12.0, LEFT, y, &fonts.bold);
    y -= LINE;
    layer.use_text(format!("Age: {}", data.age_text()), 12.0, LEFT, y, &fonts.regular);
    y -= LINE;
    layer.use_text(format!("Gender: {}", data.gender_text()), 12.0, LEFT, y, &fonts.regular);
    y -= LINE;
    layer.use_text(format!("Date: {}", data.date_text()), 12.0, LEFT, y, &fonts.bold);
    y -= LINE * 1.5;

    layer.use_text(
        format!("Number of Tumors Detected: {}", data.tumor_count()),
        12.0,
        LEFT,
        y,
        &fonts.regular,
    );
    y -= LINE;
    layer.use_text("Tumor Measurements:", 12.0, LEFT, y, &fonts.bold);
    y -= LINE;
    let (mut layer, mut y) = write_lines(&doc, layer, y, &data.measurement_lines(), &fonts.regular);

    y -= LINE * 0.5;
    if y < Mm(40.0) {
        let (page, new_layer) = doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, "Assessment");
        layer = doc.get_page(page).get_layer(new_layer);
        y = TOP;
    }
    layer.use_text("Severity Assessment:", 12.0, LEFT, y, &fonts.bold);
    y -= LINE;
    layer.use_text(
        format!("Assessment: {}", data.severity_text()),
        12.0,
        LEFT,
        y,
        &fonts.regular,
    );
    y -= LINE;
    layer.use_text(
        format!("Recommendation: {}", data.recommendation_text()),
        12.0,
        LEFT,
        y,
        &fonts.regular,
    );

    // Annotated scan
    if let Some(png) = image_png {
        let (page, layer) = doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, "Image");
        let layer = doc.get_page(page).get_layer(layer);
        layer.use_text("Processed Image:", 12.0, LEFT, TOP, &fonts.bold);
        embed_png(layer, png).context("Failed to embed processed image")?;
    }

    // Disclaimer
    let (page, layer) = doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, "Disclaimer");
    let layer = doc.get_page(page).get_layer(layer);
    layer.use_text("DISCLAIMER:", 10.0, LEFT, TOP, &fonts.italic);
    let mut y = TOP - LINE;
    for line in wrap(DISCLAIMER, DISCLAIMER_WRAP) {
        layer.use_text(line, 10.0, LEFT, y, &fonts.italic);
        y -= Mm(6.0);
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| anyhow::anyhow!("PDF save error: {e}"))?;
    buf.into_inner()
        .map_err(|e| anyhow::anyhow!("PDF buffer error: {e}"))
}

/// Write lines downwards, starting a new page when the bottom margin is hit.
/// Returns the layer in use and the next free baseline.
fn write_lines(
    doc: &PdfDocumentReference,
    mut layer: PdfLayerReference,
    mut y: Mm,
    lines: &[String],
    font: &IndirectFontRef,
) -> (PdfLayerReference, Mm) {
    for line in lines {
        if y < Mm(20.0) {
            let (page, new_layer) = doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, "Measurements");
            layer = doc.get_page(page).get_layer(new_layer);
            y = TOP;
        }
        layer.use_text(line.as_str(), 12.0, LEFT, y, font);
        y -= LINE;
    }
    (layer, y)
}

fn embed_png(layer: PdfLayerReference, png: &[u8]) -> anyhow::Result<()> {
    let decoder = PngDecoder::new(Cursor::new(png))?;
    let (px_width, px_height) = decoder.dimensions();
    let image = Image::try_from(decoder)?;

    // Fit inside the printable area
    let dpi_for_width = px_width as f32 * 25.4 / IMAGE_MAX_WIDTH_MM;
    let dpi_for_height = px_height as f32 * 25.4 / IMAGE_MAX_HEIGHT_MM;
    let dpi = dpi_for_width.max(dpi_for_height).max(1.0);
    let height_mm = px_height as f32 * 25.4 / dpi;

    image.add_to_layer(
        layer,
        ImageTransform {
            translate_x: Some(Mm(15.0)),
            translate_y: Some(Mm(TOP.0 - 15.0 - height_mm)),
            dpi: Some(dpi),
            ..Default::default()
        },
    );
    Ok(())
}

/// Greedy word wrap at `width` characters.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
