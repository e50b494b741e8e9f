//! # enamex-core: Decodificação de Spans e Reconciliação de Entidades
//!
//! Este crate transforma a saída de um tagger de sequência (rótulos BIO por
//! token) em entidades nomeadas com offsets exatos no texto original, resolve
//! expressões temporais em períodos e mescla camadas de anotação em uma
//! marcação ENAMEX aninhada.
//!
//! ## Arquitetura
//!
//! O dado flui em estágios, cada um num módulo:
//!
//! 1.  **Tokenização** ([`tokenizer`]): fronteiras de palavra Unicode, espaços preservados.
//! 2.  **Léxicos** ([`lexicon`]): intervalos de locais, títulos, organizações e formas jurídicas.
//! 3.  **Features** ([`features`]): uma linha por token para o tagger externo.
//! 4.  **Tagger** ([`tagger`]): contrato [`SequenceTagger`] e leitura da saída.
//! 5.  **Alinhamento** ([`align`]): devolve cada token rotulado ao seu offset.
//! 6.  **Decodificação** ([`span`]): rótulos → [`Entity`] com fusão por contiguidade.
//! 7.  **Períodos** ([`temporal`]): grupos de datas → [`Period`] (valor, intervalo, lista).
//! 8.  **Sentidos** ([`sense`]): rótulos WordNet livres → [`Sense`], associados às entidades.
//! 9.  **Reconciliação** ([`reconcile`]): camadas do usuário e do sistema → XML ENAMEX.
//!
//! O [`pipeline`] liga os estágios por idioma e o [`document`] guarda o
//! corpus anotado (documentos, parágrafos, sentenças).
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use std::sync::Arc;
//! use enamex_core::{LanguageParser, NerLexicon, NerParser, Result};
//!
//! // Tagger de brinquedo: "Austria" e "Germany" são locais.
//! let tagger = |input: &str| -> Result<String> {
//!     let rows: Vec<String> = input
//!         .lines()
//!         .filter_map(|row| row.split(' ').next())
//!         .map(|token| match token {
//!             "Austria" | "Germany" => format!("{token} B-LOCATION"),
//!             _ => format!("{token} O"),
//!         })
//!         .collect();
//!     Ok(rows.join("\n"))
//! };
//!
//! let parser = LanguageParser::new("en", tagger, Arc::new(NerLexicon::new()));
//! let entities = parser.extract("Austria fought the enemies with Germany.")?;
//!
//! assert_eq!(entities.len(), 2);
//! assert_eq!((entities[1].offset_start(), entities[1].offset_end()), (32, 39));
//! # Ok::<(), enamex_core::Error>(())
//! ```
//!
//! ## Logs
//!
//! Os problemas recuperáveis (linhas malformadas, offsets desalinhados, spans
//! cruzados) saem como eventos `tracing`; o crate não instala subscriber.

pub mod align;
pub mod config;
pub mod document;
pub mod entity;
pub mod error;
pub mod features;
pub mod lexicon;
pub mod metrics;
pub mod pipeline;
pub mod reconcile;
pub mod sense;
pub mod span;
pub mod tagger;
pub mod temporal;
pub mod tokenizer;

pub use config::{DecodeStrategy, NerConfig};
pub use document::{Paragraph, Sentence, TrainingDocument};
pub use entity::{Entity, EntityBuilder, EntityType, OffsetPosition, Origin, Sense};
pub use error::{Error, Result};
pub use lexicon::{LexiconIntervalIndex, NerLexicon};
pub use metrics::{LabelCounts, MetricsSink, NoopMetrics};
pub use pipeline::{attach_senses, LanguageParser, NerParser, NerParsers};
pub use reconcile::{EntityReconciler, TwoLayerCombinator};
pub use sense::{SenseDecoder, SenseParser};
pub use span::SpanDecoder;
pub use tagger::{NerTag, SequenceTagger};
pub use temporal::{Period, PeriodKind, TemporalParser};
pub use tokenizer::Token;
