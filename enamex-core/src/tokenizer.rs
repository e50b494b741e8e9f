//! # Tokenização
//!
//! A tokenização é uma capacidade **injetada**: o decodificador aceita qualquer
//! sequência de tokens brutos cujos textos, concatenados, reproduzem o texto
//! original (espaços inclusos). Este módulo fornece o tipo [`Token`] e a
//! tokenização padrão por fronteiras de palavra Unicode (UAX #29).
//!
//! ## Exemplo
//!
//! ```rust
//! use enamex_core::tokenizer::tokenize_word_bounds;
//!
//! let tokens = tokenize_word_bounds("Austria Hungary");
//! let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
//! assert_eq!(texts, vec!["Austria", " ", "Hungary"]);
//! ```

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Um token extraído do texto original.
///
/// `start`/`end` são índices de byte (fim exclusivo), a mesma convenção dos
/// offsets de [`crate::entity::Entity`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    /// O texto do token (ex: "Austria", " ", ".").
    pub text: String,
    /// Índice de byte inicial no texto original (inclusive).
    pub start: usize,
    /// Índice de byte final no texto original (exclusivo).
    pub end: usize,
    /// Índice sequencial do token na lista (0, 1, 2...).
    pub index: usize,
}

impl Token {
    /// Token composto apenas de espaço em branco (removido antes do tagger).
    pub fn is_whitespace(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Tokenização padrão: fronteiras de palavra Unicode, espaços preservados
/// como tokens próprios.
///
/// "1942-07-27" vira `1942`, `-`, `07`, `-`, `27`.
pub fn tokenize_word_bounds(text: &str) -> Vec<Token> {
    text.split_word_bound_indices()
        .enumerate()
        .map(|(index, (start, piece))| Token {
            text: piece.to_string(),
            start,
            end: start + piece.len(),
            index,
        })
        .collect()
}

/// Reconstrói tokens com posições a partir de pedaços contíguos já cortados
/// por um tokenizador externo.
pub fn tokens_from_pieces<S: AsRef<str>>(pieces: &[S]) -> Vec<Token> {
    let mut offset = 0;
    pieces
        .iter()
        .enumerate()
        .map(|(index, piece)| {
            let piece = piece.as_ref();
            let token = Token {
                text: piece.to_string(),
                start: offset,
                end: offset + piece.len(),
                index,
            };
            offset = token.end;
            token
        })
        .collect()
}

/// Remove os tokens de espaço, como é feito antes de montar a entrada do tagger.
pub fn without_whitespace(tokens: &[Token]) -> Vec<&Token> {
    tokens.iter().filter(|t| !t.is_whitespace()).collect()
}
