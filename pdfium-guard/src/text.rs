//! Page text as a lazy sequence of lines.

use crate::error::{PdfError, Result};
use crate::page::Page;
use pdfium_guard_sys::c_int;
use std::collections::VecDeque;

/// UTF-16 units fetched per `FPDFText_GetText` call.
const CHUNK_UNITS: usize = 256;

/// One line of page text.
///
/// `char_start` and `char_count` are PDFium character indices (UTF-16
/// units) and exclude the line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub char_start: usize,
    pub char_count: usize,
}

/// Iterator over the lines of a page, fetched from PDFium in chunks.
///
/// Holds a native text page registered with the document session. The text
/// page is closed when the iterator is exhausted or dropped, and also when
/// its page is closed first; the next call then yields `InvalidHandle` once.
pub struct TextRuns<'a> {
    page: &'a Page,
    text_id: Option<u64>,
    total: usize,
    fetched: usize,
    carry: Option<u16>,
    position: usize,
    line: String,
    line_start: usize,
    ready: VecDeque<TextRun>,
    finished: bool,
}

impl<'a> TextRuns<'a> {
    pub(crate) fn new(page: &'a Page, text_id: u64, total: usize) -> Self {
        Self {
            page,
            text_id: Some(text_id),
            total,
            fetched: 0,
            carry: None,
            position: 0,
            line: String::new(),
            line_start: 0,
            ready: VecDeque::new(),
            finished: false,
        }
    }

    /// Total character count reported by PDFium.
    pub fn char_count(&self) -> usize {
        self.total
    }

    fn fetch_chunk(&mut self) -> Result<Vec<u16>> {
        let text_id = self.text_id.ok_or(PdfError::InvalidHandle { kind: "text page" })?;
        let state = self.page.session.borrow();
        let Some(entry) = state.text_pages.get(&text_id) else {
            let kind = if state.pages.contains_key(&self.page.id) {
                "text page"
            } else {
                "page"
            };
            return Err(PdfError::InvalidHandle { kind });
        };
        let raw = entry.handle.borrow()?.as_ptr();

        let count = CHUNK_UNITS.min(self.total - self.fetched);
        let mut buf = vec![0u16; count + 1];
        // SAFETY: `raw` is alive while the session borrow is held, and the
        // buffer has room for `count` units plus the terminator.
        let written = unsafe {
            entry.handle.engine().text_get_text(
                raw,
                self.fetched as c_int,
                count as c_int,
                buf.as_mut_ptr(),
            )
        };
        if written <= 1 {
            return Err(PdfError::TextExtractionFailed {
                reason: format!(
                    "FPDFText_GetText returned nothing at char {} of {}",
                    self.fetched, self.total
                ),
            });
        }
        buf.truncate((written as usize - 1).min(count));
        self.fetched += buf.len();
        Ok(buf)
    }

    fn feed(&mut self, mut units: Vec<u16>) {
        if let Some(high) = self.carry.take() {
            units.insert(0, high);
        }
        // A surrogate pair may straddle two chunks.
        if self.fetched < self.total && units.last().is_some_and(|u| (0xD800..0xDC00).contains(u)) {
            self.carry = units.pop();
        }
        for c in char::decode_utf16(units) {
            self.push_char(c.unwrap_or(char::REPLACEMENT_CHARACTER));
        }
    }

    fn push_char(&mut self, c: char) {
        if c == '\n' {
            self.end_line();
            self.position += 1;
            self.line_start = self.position;
        } else {
            self.line.push(c);
            self.position += c.len_utf16();
        }
    }

    fn end_line(&mut self) {
        let mut text = std::mem::take(&mut self.line);
        let mut count = self.position - self.line_start;
        if text.ends_with('\r') {
            text.pop();
            count -= 1;
        }
        self.ready.push_back(TextRun {
            text,
            char_start: self.line_start,
            char_count: count,
        });
    }

    fn finish(&mut self) {
        if self.carry.take().is_some() {
            self.push_char(char::REPLACEMENT_CHARACTER);
        }
        if !self.line.is_empty() {
            self.end_line();
        }
        self.finished = true;
        self.release();
    }

    fn release(&mut self) {
        let Some(text_id) = self.text_id.take() else {
            return;
        };
        match self.page.session.try_borrow_mut() {
            Ok(mut state) => {
                if let Some(mut entry) = state.text_pages.remove(&text_id) {
                    if let Err(err) = entry.handle.destroy() {
                        tracing::warn!("Failed to close text page: {}", err);
                    }
                }
            }
            // Left for the page or the session to close.
            Err(_) => tracing::debug!("Text page release deferred; session is busy"),
        }
    }
}

impl Iterator for TextRuns<'_> {
    type Item = Result<TextRun>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(run) = self.ready.pop_front() {
                return Some(Ok(run));
            }
            if self.finished {
                return None;
            }
            if self.fetched >= self.total {
                self.finish();
                continue;
            }
            match self.fetch_chunk() {
                Ok(units) => self.feed(units),
                Err(err) => {
                    self.finished = true;
                    self.ready.clear();
                    self.release();
                    return Some(Err(err));
                }
            }
        }
    }
}

impl Drop for TextRuns<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for TextRuns<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRuns")
            .field("page", &self.page.index())
            .field("total", &self.total)
            .field("fetched", &self.fetched)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Decode UTF-16LE bytes up to the first NUL unit, replacing unpaired
/// surrogates.
pub(crate) fn utf16le_to_string(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0);
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Decode UTF-16 units, replacing unpaired surrogates.
pub(crate) fn utf16_to_string(units: &[u16]) -> String {
    char::decode_utf16(units.iter().copied())
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
