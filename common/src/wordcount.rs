use std::{
    collections::BTreeMap,
    fs, io,
    path::Path,
};

/// Conteo palabra -> ocurrencias. Ordenado para que la salida sea determinista.
pub type Counts = BTreeMap<String, u64>;

/// Carácter de palabra: letras (incluye acentuadas), dígitos, '_' y el apóstrofo.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '\''
}

/// Devuelve las corridas máximas de caracteres de palabra, sin normalizar.
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !is_word_char(c))
        .filter(|t| !t.is_empty())
}

/// Map de WordCount: tokeniza, pasa a minúsculas y cuenta.
pub fn count_words(text: &str) -> Counts {
    let mut counts = Counts::new();
    for token in tokenize(text) {
        *counts.entry(token.to_lowercase()).or_insert(0) += 1;
    }
    counts
}

/// Igual que `count_words` pero sobre un archivo (split subido al worker).
/// Bytes que no sean UTF-8 válido se reemplazan en vez de fallar.
pub fn count_words_in_file(path: &Path) -> io::Result<Counts> {
    let bytes = fs::read(path)?;
    Ok(count_words(&String::from_utf8_lossy(&bytes)))
}

/// Reduce: suma los conteos por clave. Asociativa y conmutativa.
pub fn merge_counts<'a, I>(partials: I) -> Counts
where
    I: IntoIterator<Item = &'a Counts>,
{
    let mut total = Counts::new();
    for partial in partials {
        merge_into(&mut total, partial);
    }
    total
}

pub fn merge_into(acc: &mut Counts, partial: &Counts) {
    for (k, v) in partial {
        *acc.entry(k.clone()).or_insert(0) += v;
    }
}
