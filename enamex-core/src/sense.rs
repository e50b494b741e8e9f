//! # Sentidos (WordNet)
//!
//! O tagger de sentidos rotula tokens com sentidos finos do WordNet
//! (`country/N1`, `B-contestant/N1`). Os rótulos são livres, então a
//! decodificação usa o núcleo genérico de [`crate::span`] com `String` no
//! lugar de [`crate::entity::EntityType`]: mesmo alinhamento, mesma fusão por
//! contiguidade e mesma regra do espaço inicial das entidades.
//!
//! | Rótulo          | Interpretação          |
//! |-----------------|------------------------|
//! | `B-country/N1`  | início de `country/N1` |
//! | `country/N1`    | continuação            |
//! | `O` / `other`   | fora de sentido        |
//!
//! Cada sentido recebe a descrição registrada no [`NerLexicon`], se houver,
//! e é depois associado às entidades por [`attach_senses`].

use std::borrow::Cow;
use std::sync::Arc;

use tracing::debug;

use crate::align::OffsetAligner;
use crate::config::{DecodeStrategy, NerConfig};
use crate::entity::{Entity, OffsetPosition, Sense};
use crate::error::Result;
use crate::features::to_feature_vectors;
use crate::lexicon::NerLexicon;
use crate::pipeline::{attach_senses, TokenizeFn};
use crate::span::{decode_clustered, decode_spans, LabeledSpan};
use crate::tagger::{parse_tagger_output, LabeledToken, SequenceTagger};
use crate::temporal::TemporalLexicon;
use crate::tokenizer::tokenize_word_bounds;

/// Confiança atribuída aos sentidos decodificados.
pub const DEFAULT_SENSE_CONF: f64 = 0.7;

fn classify_sense(label: &str) -> Result<Option<(String, bool)>> {
    let label = label.trim();
    if label.is_empty() || label == "O" || label.eq_ignore_ascii_case("other") {
        return Ok(None);
    }
    Ok(Some(match label.strip_prefix("B-") {
        Some(rest) => (rest.to_string(), true),
        None => (label.strip_prefix("I-").unwrap_or(label).to_string(), false),
    }))
}

/// Decodificador de sentidos.
#[derive(Debug, Clone)]
pub struct SenseDecoder {
    skip_leading_space: bool,
    strategy: DecodeStrategy,
    conf: f64,
}

impl Default for SenseDecoder {
    fn default() -> Self {
        Self {
            skip_leading_space: true,
            strategy: DecodeStrategy::TokenByToken,
            conf: DEFAULT_SENSE_CONF,
        }
    }
}

impl SenseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mesma estratégia e regra do espaço inicial da configuração NER.
    pub fn from_config(config: &NerConfig) -> Self {
        Self {
            skip_leading_space: config.skip_leading_space,
            strategy: config.decode_strategy,
            ..Self::default()
        }
    }

    /// Sentidos da saída rotulada, em ordem de offset, com a descrição do
    /// léxico quando conhecida.
    pub fn extract<S: AsRef<str>>(
        &self,
        text: &str,
        raw_tokens: &[S],
        labeled: &[LabeledToken],
        lexicon: &NerLexicon,
    ) -> Result<Vec<Sense>> {
        let aligned = OffsetAligner::align(raw_tokens, labeled);
        let spans = match self.strategy {
            DecodeStrategy::TokenByToken => decode_spans(text, &aligned, self.skip_leading_space, classify_sense)?,
            DecodeStrategy::Clustered => decode_clustered(text, &aligned, self.skip_leading_space, classify_sense)?,
        };
        Ok(spans.into_iter().map(|span| self.sense(span, lexicon)).collect())
    }

    fn sense(&self, span: LabeledSpan<String>, lexicon: &NerLexicon) -> Sense {
        Sense {
            conf: self.conf,
            description: lexicon.sense_description(&span.label).map(str::to_string),
            offsets: Some(OffsetPosition {
                start: span.start,
                end: span.end,
            }),
            ..Sense::new(span.label.clone(), span.label)
        }
    }
}

/// Extração de sentidos sobre um tagger de sentidos.
///
/// Monta as mesmas features do parser NER (tokenização, léxicos, datas) e
/// compartilha o léxico via `Arc`.
pub struct SenseParser<T: SequenceTagger> {
    tagger: T,
    lexicon: Arc<NerLexicon>,
    temporal: Arc<TemporalLexicon>,
    tokenize: TokenizeFn,
    config: NerConfig,
    decoder: SenseDecoder,
}

impl<T: SequenceTagger> SenseParser<T> {
    pub fn new(tagger: T, lexicon: Arc<NerLexicon>) -> Self {
        let config = NerConfig::default();
        Self {
            tagger,
            lexicon,
            temporal: Arc::new(TemporalLexicon::new()),
            tokenize: Arc::new(tokenize_word_bounds),
            decoder: SenseDecoder::from_config(&config),
            config,
        }
    }

    /// Substitui a configuração (validada).
    pub fn with_config(mut self, config: NerConfig) -> Result<Self> {
        config.validate()?;
        self.decoder = SenseDecoder::from_config(&config);
        self.config = config;
        Ok(self)
    }

    /// Usa o mesmo tokenizador do parser NER, para que os offsets dos
    /// sentidos e das entidades coincidam.
    pub fn with_shared_tokenizer(mut self, tokenize: TokenizeFn) -> Self {
        self.tokenize = tokenize;
        self
    }

    /// Sentidos do texto, offsets em bytes, em ordem.
    pub fn extract_senses(&self, text: &str) -> Result<Vec<Sense>> {
        let text: Cow<'_, str> = if self.config.replace_newlines && text.contains('\n') {
            Cow::Owned(text.replace('\n', " "))
        } else {
            Cow::Borrowed(text)
        };

        let tokens = (self.tokenize)(&text);
        let indexes = self.lexicon.compute_indexes(&tokens);
        let input = to_feature_vectors(&tokens, &indexes, &self.temporal);
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let output = self.tagger.tag(&input)?;
        let labeled = parse_tagger_output(&output);
        let senses = self.decoder.extract(&text, &tokens, &labeled, &self.lexicon)?;
        debug!(sentidos = senses.len(), tokens = tokens.len(), "sentidos extraídos");
        Ok(senses)
    }

    /// Extrai os sentidos de `text` e os associa às `entities` do mesmo texto.
    pub fn annotate(&self, text: &str, entities: Vec<Entity>) -> Result<Vec<Entity>> {
        let senses = self.extract_senses(text)?;
        Ok(attach_senses(entities, &senses))
    }
}
