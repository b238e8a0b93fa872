#![allow(dead_code)]

use flate2::read::ZlibDecoder;
use rust_xlsxwriter::Workbook;
use std::io::{Cursor, Read};
use surveillances::{DateFormat, DocumentKind};

pub const HEADERS: [&str; 6] = ["Enseignant", "Matière", "VraiMatière", "Date", "Horaire", "Salle"];

/// One schedule line: teacher, subject, exam, ISO date, slot.
pub type Line<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str);

/// Build an xlsx schedule in memory.
pub fn workbook(lines: &[Line]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, title) in HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *title).unwrap();
    }
    for (i, (person, subject, exam, date, slot)) in lines.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, *person).unwrap();
        sheet.write_string(row, 1, *subject).unwrap();
        sheet.write_string(row, 2, *exam).unwrap();
        sheet.write_string(row, 3, *date).unwrap();
        sheet.write_string(row, 4, *slot).unwrap();
        sheet.write_string(row, 5, "Amphi A").unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

pub fn dates(kind: DocumentKind) -> DateFormat {
    match kind {
        DocumentKind::Convocation => DateFormat::new("fr_FR", "%A %d %B %Y").unwrap(),
        DocumentKind::Fiche => DateFormat::new("fr_FR", "%A %-d %B %Y").unwrap(),
    }
}

/// Entry names of a zip, in archive order.
pub fn entry_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

pub fn entry_bytes(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut out = Vec::new();
    entry.read_to_end(&mut out).unwrap();
    out
}

/// Page content of a PDF: every stream, inflated when compressed.
pub fn pdf_content(pdf: &[u8]) -> Vec<u8> {
    let mut content = Vec::new();
    let mut rest = pdf;
    while let Some(start) = find(rest, b"stream") {
        let mut body = &rest[start + b"stream".len()..];
        if body.starts_with(b"\r\n") {
            body = &body[2..];
        } else if body.starts_with(b"\n") {
            body = &body[1..];
        }
        let Some(end) = find(body, b"endstream") else { break };
        let raw = &body[..end];
        let mut inflated = Vec::new();
        match ZlibDecoder::new(raw).read_to_end(&mut inflated) {
            Ok(_) => content.extend_from_slice(&inflated),
            Err(_) => content.extend_from_slice(raw),
        }
        content.push(b'\n');
        rest = &body[end + b"endstream".len()..];
    }
    content
}

/// Whether `word` is drawn on a page, as a literal or a hex string.
pub fn pdf_shows(pdf: &[u8], word: &str) -> bool {
    let content = pdf_content(pdf);
    let hex: String = word.bytes().map(|b| format!("{:02X}", b)).collect();
    find(&content, word.as_bytes()).is_some()
        || find(&content, hex.as_bytes()).is_some()
        || find(&content, hex.to_lowercase().as_bytes()).is_some()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
