// crates/deal-kernel-http/tests/pdf.rs
// ============================================================================
// Module: Cover Sheet PDF Tests
// Description: Tests for the deterministic PDF writer.
// ============================================================================
//! ## Overview
//! The cover sheet must be byte-identical for identical lines and must keep
//! its layout independent of text content that needs escaping.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use deal_kernel_http::render_cover_sheet;

// ============================================================================
// SECTION: Determinism
// ============================================================================

/// Tests identical lines yield identical bytes.
#[test]
fn test_render_is_deterministic() {
    let lines = vec![
        "Compliance Snapshot".to_string(),
        "Deal: 1234".to_string(),
        "State: Closed  Stress: SM0".to_string(),
    ];
    let first = render_cover_sheet(&lines);
    let second = render_cover_sheet(&lines);
    assert_eq!(first, second);
}

/// Tests different lines yield different bytes.
#[test]
fn test_render_reflects_content() {
    let first = render_cover_sheet(&["State: Closed".to_string()]);
    let second = render_cover_sheet(&["State: Frozen".to_string()]);
    assert_ne!(first, second);
}

// ============================================================================
// SECTION: Structure
// ============================================================================

/// Tests the output carries the PDF header and trailer markers.
#[test]
fn test_render_emits_pdf_structure() {
    let bytes = render_cover_sheet(&["hello".to_string()]);
    assert!(bytes.starts_with(b"%PDF-1.4"));
    assert!(bytes.ends_with(b"%%EOF\n"));
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("/BaseFont /Helvetica"));
    assert!(text.contains("startxref"));
}

/// Tests parentheses and backslashes are escaped in literal strings.
#[test]
fn test_render_escapes_literals() {
    let bytes = render_cover_sheet(&["file (v2) \\ final".to_string()]);
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("(file \\(v2\\) \\\\ final) Tj"));
}

/// Tests overflowing line counts truncate deterministically.
#[test]
fn test_render_truncates_overflow() {
    let lines: Vec<String> = (0..100).map(|index| format!("line {index}")).collect();
    let first = render_cover_sheet(&lines);
    let second = render_cover_sheet(&lines);
    assert_eq!(first, second);
    let text = String::from_utf8_lossy(&first);
    assert!(text.contains("more lines omitted"));
}
