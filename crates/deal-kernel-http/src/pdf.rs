// crates/deal-kernel-http/src/pdf.rs
// ============================================================================
// Module: Deterministic Cover Sheet PDF
// Description: Minimal fixed-layout PDF writer for compliance cover sheets.
// Purpose: Produce byte-identical PDFs for identical replay inputs.
// Dependencies: none
// ============================================================================

//! ## Overview
//! ProofPack determinism requires the cover sheet to be a pure function of
//! its text lines. This writer emits a single-page PDF with the built-in
//! Helvetica Base-14 font, fixed object numbering, fixed line metrics, and
//! no creation metadata, so identical lines always yield identical bytes.

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Page width in PDF points (US Letter).
const PAGE_WIDTH: u32 = 612;
/// Page height in PDF points (US Letter).
const PAGE_HEIGHT: u32 = 792;
/// Left text margin in points.
const MARGIN_LEFT: u32 = 50;
/// First baseline from the page bottom.
const FIRST_BASELINE: u32 = 742;
/// Font size in points.
const FONT_SIZE: u32 = 10;
/// Line leading in points.
const LEADING: u32 = 14;
/// Maximum rendered lines (one page).
const MAX_LINES: usize = 48;

// ============================================================================
// SECTION: Renderer
// ============================================================================

/// Renders text lines into a deterministic single-page PDF.
#[must_use]
pub fn render_cover_sheet(lines: &[String]) -> Vec<u8> {
    let mut shown: Vec<&str> = lines.iter().map(String::as_str).collect();
    let omitted = shown.len().saturating_sub(MAX_LINES);
    let overflow_line;
    if omitted > 0 {
        shown.truncate(MAX_LINES.saturating_sub(1));
        overflow_line = format!("(+{omitted} more lines omitted)");
        shown.push(&overflow_line);
    }

    let content = content_stream(&shown);
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] /Resources \
             << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len()),
    ];

    let mut out: Vec<u8> = Vec::with_capacity(1024 + content.len());
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets: Vec<usize> = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", index + 1).as_bytes());
    }
    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}

// ============================================================================
// SECTION: Content Stream
// ============================================================================

/// Builds the page content stream for the given lines.
fn content_stream(lines: &[&str]) -> String {
    let mut content = String::new();
    content.push_str("BT\n");
    content.push_str(&format!("/F1 {FONT_SIZE} Tf\n{LEADING} TL\n"));
    content.push_str(&format!("{MARGIN_LEFT} {FIRST_BASELINE} Td\n"));
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            content.push_str("T*\n");
        }
        content.push('(');
        content.push_str(&escape_text(line));
        content.push_str(") Tj\n");
    }
    content.push_str("ET");
    content
}

/// Escapes a text line for a PDF literal string.
///
/// Non-ASCII and control characters are replaced so the byte layout never
/// depends on the platform text encoding.
fn escape_text(line: &str) -> String {
    let mut escaped = String::with_capacity(line.len());
    for ch in line.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '(' => escaped.push_str("\\("),
            ')' => escaped.push_str("\\)"),
            ch if ch.is_ascii_graphic() || ch == ' ' => escaped.push(ch),
            _ => escaped.push('?'),
        }
    }
    escaped
}
