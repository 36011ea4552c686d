//! Media-type dispatching text extraction.
//!
//! Contract: recognized-but-unsupported types (spreadsheets, presentations,
//! images) log a warning and yield an empty string rather than an error, so a
//! stray file never fails the pipeline. Extraction text under
//! [`MIN_TEXT_LEN`] chars is treated as "skip this file" by the caller.

use crate::drive::{DriveClient, SourceDocument};
use crate::error::{GrantRagError, Result};

/// Minimum usable extracted-text length; shorter results are skipped.
pub const MIN_TEXT_LEN: usize = 50;

pub mod mime {
    pub const GOOGLE_DOC: &str = "application/vnd.google-apps.document";
    pub const PDF: &str = "application/pdf";
    pub const DOCX: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
    pub const DOC: &str = "application/msword";
    pub const TEXT: &str = "text/plain";
    pub const CSV: &str = "text/csv";
    pub const SHEET: &str = "application/vnd.google-apps.spreadsheet";
    pub const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
    pub const SLIDES: &str = "application/vnd.google-apps.presentation";
}

/// Is this a media type the pipeline will attempt to extract text from?
pub fn is_supported(mime_type: &str) -> bool {
    matches!(
        mime_type,
        mime::GOOGLE_DOC | mime::PDF | mime::DOCX | mime::DOC | mime::TEXT | mime::CSV
    )
}

/// Extract plain text from a source document, dispatching by media type.
pub async fn extract_text(drive: &dyn DriveClient, doc: &SourceDocument) -> Result<String> {
    match doc.mime_type.as_str() {
        mime::GOOGLE_DOC => drive.export_plain_text(&doc.id).await,
        mime::PDF => {
            let bytes = drive.download(&doc.id).await?;
            pdf_to_text(bytes).await
        }
        mime::DOCX => {
            let bytes = drive.download(&doc.id).await?;
            docx_to_text(&bytes)
                .map_err(|e| GrantRagError::Extract(format!("{}: {}", doc.name, e)))
        }
        mime::DOC => {
            // Legacy Word: attempted as DOCX; failures are expected and logged
            let bytes = drive.download(&doc.id).await?;
            match docx_to_text(&bytes) {
                Ok(text) => Ok(text),
                Err(e) => {
                    log::warn!("Legacy .doc extraction failed for {}: {}", doc.name, e);
                    Ok(String::new())
                }
            }
        }
        mime::TEXT | mime::CSV => {
            let bytes = drive.download(&doc.id).await?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        other => {
            log::warn!(
                "Unsupported media type '{}' for {} — skipping text extraction",
                other,
                doc.name
            );
            Ok(String::new())
        }
    }
}

/// PDF extraction runs on the blocking pool; pdf-extract is CPU-bound and
/// can take seconds on font-heavy documents.
async fn pdf_to_text(bytes: Vec<u8>) -> Result<String> {
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| GrantRagError::Extract(format!("pdf task panicked: {}", e)))?
        .map_err(|e| GrantRagError::Extract(format!("pdf extraction: {}", e)))?;

    // Drop null bytes and per-line whitespace noise common in PDF output
    let cleaned = text
        .replace('\0', "")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    Ok(cleaned)
}

/// Walk paragraph runs of a DOCX body, one line per paragraph.
fn docx_to_text(bytes: &[u8]) -> std::result::Result<String, docx_rs::ReaderError> {
    let doc = docx_rs::read_docx(bytes)?;
    let mut out = String::new();
    for child in doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            for paragraph_child in paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = paragraph_child {
                    for run_child in run.children {
                        if let docx_rs::RunChild::Text(text) = run_child {
                            out.push_str(&text.text);
                        }
                    }
                }
            }
            out.push('\n');
        }
    }
    Ok(out)
}
