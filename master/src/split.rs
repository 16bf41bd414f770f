// master/src/split.rs

use std::{borrow::Cow, ops::Range, sync::Arc};

use common::wordcount::{self, Counts};

/// Una unidad de input asignada a un map. Identidad: (job, index).
#[derive(Debug, Clone)]
pub struct Split {
    pub index: u32,
    pub payload: SplitPayload,
}

#[derive(Debug, Clone)]
pub enum SplitPayload {
    /// Texto en línea (submit de texto)
    Inline(String),
    /// Rango de bytes de un input subido; se sube al worker antes del map
    Bytes { data: Arc<Vec<u8>>, range: Range<usize> },
}

impl Split {
    pub fn inline(index: u32, text: String) -> Self {
        Self {
            index,
            payload: SplitPayload::Inline(text),
        }
    }

    pub fn bytes(index: u32, data: Arc<Vec<u8>>, range: Range<usize>) -> Self {
        Self {
            index,
            payload: SplitPayload::Bytes { data, range },
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        match &self.payload {
            SplitPayload::Inline(s) => Cow::Borrowed(s.as_str()),
            SplitPayload::Bytes { data, range } => String::from_utf8_lossy(&data[range.clone()]),
        }
    }

    pub fn raw_bytes(&self) -> &[u8] {
        match &self.payload {
            SplitPayload::Inline(s) => s.as_bytes(),
            SplitPayload::Bytes { data, range } => &data[range.clone()],
        }
    }

    /// Map local, usado cuando ningún worker pudo hacerlo.
    pub fn count_locally(&self) -> Counts {
        wordcount::count_words(&self.text())
    }
}

/// Particiona respetando palabras: junta tokens separados por un espacio
/// hasta que el siguiente (más el separador) pase de `size` caracteres.
pub fn split_words(text: &str, size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut curr: Vec<&str> = Vec::new();
    let mut curr_len = 0usize;

    for token in wordcount::tokenize(text) {
        let l = token.chars().count() + 1;
        if curr_len + l > size && !curr.is_empty() {
            chunks.push(curr.join(" "));
            curr.clear();
            curr_len = 0;
        }
        curr.push(token);
        curr_len += l;
    }

    if !curr.is_empty() {
        chunks.push(curr.join(" "));
    }
    chunks
}

/// Particiona por offsets de bytes (~`size` por rango) sin cortar tokens:
/// retrocede hasta el último espacio del rango, y si no hay ninguno avanza
/// hasta el siguiente. Los cortes caen siempre junto a un espacio ASCII, así
/// que cada rango es UTF-8 válido si el input lo es.
pub fn split_byte_ranges(data: &[u8], size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    let mut out = Vec::new();
    let mut start = 0usize;

    while start < data.len() {
        let mut end = start.saturating_add(size).min(data.len());

        let cuts_token = end < data.len()
            && !data[end].is_ascii_whitespace()
            && !data[end - 1].is_ascii_whitespace();

        if cuts_token {
            end = match data[start..end].iter().rposition(|b| b.is_ascii_whitespace()) {
                Some(pos) => start + pos + 1,
                None => data[end..]
                    .iter()
                    .position(|b| b.is_ascii_whitespace())
                    .map_or(data.len(), |p| end + p),
            };
        }

        out.push(start..end);
        start = end;
    }

    out
}
