//! # Vetores de Features para o Tagger
//!
//! Cada token (sem os espaços) vira uma linha de colunas separadas por
//! espaço, consumida pelo tagger externo. A última coluna é o rótulo de
//! treino, ou `0` na inferência.
//!
//! ## Colunas (NER)
//!
//! | #     | Feature                                   |
//! |-------|-------------------------------------------|
//! | 1     | token                                     |
//! | 2     | token em minúsculas                       |
//! | 3-7   | prefixos de 1 a 5 caracteres              |
//! | 8-12  | sufixos de 1 a 5 caracteres               |
//! | 13    | capitalização (`NOCAPS` se só dígitos)    |
//! | 14    | classe de dígitos                         |
//! | 15-16 | ano, mês                                  |
//! | 17-20 | local, título, organização, forma jurídica|
//! | 21-22 | forma da palavra, forma compactada        |
//! | 23    | rótulo ou `0`                             |

use std::fmt;

use crate::lexicon::{LexiconFlags, LexiconPositionsIndexes};
use crate::temporal::TemporalLexicon;
use crate::tokenizer::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capitalisation {
    AllCaps,
    InitCap,
    NoCaps,
}

impl Capitalisation {
    pub fn of(word: &str) -> Self {
        if !word.chars().any(char::is_alphabetic) {
            return Capitalisation::NoCaps;
        }
        if word.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase) {
            Capitalisation::AllCaps
        } else if word.chars().next().is_some_and(char::is_uppercase) {
            Capitalisation::InitCap
        } else {
            Capitalisation::NoCaps
        }
    }
}

impl fmt::Display for Capitalisation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capitalisation::AllCaps => "ALLCAPS",
            Capitalisation::InitCap => "INITCAP",
            Capitalisation::NoCaps => "NOCAPS",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitClass {
    AllDigit,
    ContainDigit,
    NoDigit,
}

impl DigitClass {
    pub fn of(word: &str) -> Self {
        if !word.is_empty() && word.chars().all(|c| c.is_ascii_digit()) {
            DigitClass::AllDigit
        } else if word.chars().any(|c| c.is_ascii_digit()) {
            DigitClass::ContainDigit
        } else {
            DigitClass::NoDigit
        }
    }
}

impl fmt::Display for DigitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DigitClass::AllDigit => "ALLDIGIT",
            DigitClass::ContainDigit => "CONTAINDIGIT",
            DigitClass::NoDigit => "NODIGIT",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunctType {
    NoPunct,
    OpenBracket,
    EndBracket,
    Dot,
    Comma,
    Hyphen,
    Quote,
    Slash,
    Punct,
}

impl PunctType {
    pub fn of(word: &str) -> Self {
        match word {
            "(" | "[" => PunctType::OpenBracket,
            ")" | "]" => PunctType::EndBracket,
            "." => PunctType::Dot,
            "," => PunctType::Comma,
            "-" => PunctType::Hyphen,
            "\"" | "'" | "`" => PunctType::Quote,
            "/" | "\\" => PunctType::Slash,
            w if !w.is_empty() && w.chars().all(|c| c.is_ascii_punctuation()) => PunctType::Punct,
            _ => PunctType::NoPunct,
        }
    }
}

impl fmt::Display for PunctType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PunctType::NoPunct => "NOPUNCT",
            PunctType::OpenBracket => "OPENBRACKET",
            PunctType::EndBracket => "ENDBRACKET",
            PunctType::Dot => "DOT",
            PunctType::Comma => "COMMA",
            PunctType::Hyphen => "HYPHEN",
            PunctType::Quote => "QUOTE",
            PunctType::Slash => "SLASH",
            PunctType::Punct => "PUNCT",
        })
    }
}

/// Primeiros `n` caracteres (a palavra inteira se for menor).
pub fn prefix(word: &str, n: usize) -> String {
    word.chars().take(n).collect()
}

/// Últimos `n` caracteres (a palavra inteira se for menor).
pub fn suffix(word: &str, n: usize) -> String {
    let len = word.chars().count();
    word.chars().skip(len.saturating_sub(n)).collect()
}

/// Maiúscula → `X`, minúscula → `x`, dígito → `d`, resto mantido.
pub fn word_shape(word: &str) -> String {
    word.chars()
        .map(|c| {
            if c.is_uppercase() {
                'X'
            } else if c.is_alphabetic() {
                'x'
            } else if c.is_ascii_digit() {
                'd'
            } else {
                c
            }
        })
        .collect()
}

/// Forma da palavra com repetições consecutivas reduzidas a uma.
pub fn word_shape_trimmed(word: &str) -> String {
    let mut shape: Vec<char> = word_shape(word).chars().collect();
    shape.dedup();
    shape.into_iter().collect()
}

/// Contém quatro dígitos seguidos começando por 1 ou 2.
pub fn is_year(word: &str) -> bool {
    let chars: Vec<char> = word.chars().collect();
    chars
        .windows(4)
        .any(|w| matches!(w[0], '1' | '2') && w.iter().all(|c| c.is_ascii_digit()))
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Vetor de features de um token para o modelo NER.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturesVectorNer {
    pub string: String,
    pub label: Option<String>,
    pub capitalisation: Capitalisation,
    pub digit: DigitClass,
    pub year: bool,
    pub month: bool,
    pub lexicon: LexiconFlags,
    pub word_shape: String,
    pub word_shape_trimmed: String,
}

impl FeaturesVectorNer {
    pub fn new(token: &str, label: Option<&str>, lexicon: LexiconFlags, temporal: &TemporalLexicon) -> Self {
        Self {
            string: token.to_string(),
            label: label.map(str::to_string),
            capitalisation: Capitalisation::of(token),
            digit: DigitClass::of(token),
            year: is_year(token),
            month: temporal.is_month(token),
            lexicon,
            word_shape: word_shape(token),
            word_shape_trimmed: word_shape_trimmed(token),
        }
    }

    pub fn print_vector(&self) -> String {
        let s = &self.string;
        let mut cols: Vec<String> = Vec::with_capacity(23);
        cols.push(s.clone());
        cols.push(s.to_lowercase());
        cols.extend((1..=5).map(|n| prefix(s, n)));
        cols.extend((1..=5).map(|n| suffix(s, n)));

        let capitalisation = if self.digit == DigitClass::AllDigit {
            Capitalisation::NoCaps
        } else {
            self.capitalisation
        };
        cols.push(capitalisation.to_string());
        cols.push(self.digit.to_string());

        for value in [
            self.year,
            self.month,
            self.lexicon.location,
            self.lexicon.person_title,
            self.lexicon.organisation,
            self.lexicon.org_form,
        ] {
            cols.push(flag(value).to_string());
        }

        cols.push(self.word_shape.clone());
        cols.push(self.word_shape_trimmed.clone());
        cols.push(self.label.clone().unwrap_or_else(|| "0".to_string()));
        cols.join(" ")
    }
}

/// Linhas de entrada do tagger NER para um documento inteiro.
///
/// Uma única varredura dos índices de léxico; os tokens de espaço são
/// consultados também, para manter as consultas em ordem, mas não geram linha.
pub fn to_feature_vectors(tokens: &[Token], indexes: &LexiconPositionsIndexes, temporal: &TemporalLexicon) -> String {
    let mut scan = indexes.scanner();
    let mut rows = Vec::with_capacity(tokens.len());
    for token in tokens {
        let flags = scan.flags_at(token.index);
        if token.is_whitespace() {
            continue;
        }
        rows.push(FeaturesVectorNer::new(&token.text, None, flags, temporal).print_vector());
    }
    rows.join("\n")
}

/// Vetor de features de um token para o modelo de datas.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturesVectorDates {
    pub string: String,
    pub label: Option<String>,
    pub capitalisation: Capitalisation,
    pub digit: DigitClass,
    pub single_char: bool,
    pub year: bool,
    pub month: bool,
    pub punct_type: PunctType,
    pub word_shape: String,
}

impl FeaturesVectorDates {
    pub fn new(token: &str, label: Option<&str>, temporal: &TemporalLexicon) -> Self {
        Self {
            string: token.to_string(),
            label: label.map(str::to_string),
            capitalisation: Capitalisation::of(token),
            digit: DigitClass::of(token),
            single_char: token.chars().count() == 1,
            year: is_year(token),
            month: temporal.is_month(token),
            punct_type: PunctType::of(token),
            word_shape: word_shape(token),
        }
    }

    pub fn print_vector(&self) -> String {
        let s = &self.string;
        let mut cols: Vec<String> = Vec::with_capacity(18);
        cols.push(s.clone());
        cols.push(s.to_lowercase());
        cols.extend((1..=4).map(|n| prefix(s, n)));
        cols.extend((1..=4).map(|n| suffix(s, n)));
        let capitalisation = if self.digit == DigitClass::AllDigit {
            Capitalisation::NoCaps
        } else {
            self.capitalisation
        };
        cols.push(capitalisation.to_string());
        cols.push(self.digit.to_string());
        cols.push(flag(self.single_char).to_string());
        cols.push(flag(self.year).to_string());
        cols.push(flag(self.month).to_string());
        cols.push(self.punct_type.to_string());
        cols.push(self.word_shape.clone());
        cols.push(self.label.clone().unwrap_or_else(|| "0".to_string()));
        cols.join(" ")
    }
}

/// Linhas de entrada do tagger de datas (espaços removidos).
pub fn to_date_feature_vectors(tokens: &[Token], temporal: &TemporalLexicon) -> String {
    tokens
        .iter()
        .filter(|t| !t.is_whitespace())
        .map(|t| FeaturesVectorDates::new(&t.text, None, temporal).print_vector())
        .collect::<Vec<_>>()
        .join("\n")
}
