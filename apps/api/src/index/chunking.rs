#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_index: i32,
    pub text: String,
}

/// Splits `text` into consecutive `words_per_chunk`-word slices.
///
/// Whitespace inside a chunk is normalised to single spaces. Text with no words
/// still yields one chunk holding the original text, so every indexed version
/// is searchable.
pub fn chunk_words(text: &str, words_per_chunk: usize) -> Vec<Chunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return vec![Chunk {
            chunk_index: 0,
            text: text.to_string(),
        }];
    }

    words
        .chunks(words_per_chunk.max(1))
        .enumerate()
        .map(|(i, slice)| Chunk {
            chunk_index: i as i32,
            text: slice.join(" "),
        })
        .collect()
}
