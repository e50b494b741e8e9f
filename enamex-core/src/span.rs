//! # Decodificação de Spans
//!
//! Transforma a saída token a token do tagger em spans com offsets exatos no
//! texto original. O núcleo é genérico no rótulo: [`SpanDecoder`] o usa com
//! [`EntityType`] e o decodificador de sentidos ([`crate::sense`]) com os
//! rótulos livres do tagger de sentidos.
//!
//! ## Algoritmo (token a token)
//!
//! Para cada token alinhado (ver [`crate::align`]):
//!
//! - `B-X`: se há span aberto do rótulo `X` terminando exatamente no
//!   `offset` do token, ele é estendido (fusão por contiguidade: "Austria
//!   Hungary" com `B-LOCATION B-LOCATION` vira uma entidade só). Senão o
//!   span aberto é emitido e um novo começa no token.
//! - `X` / `I-X`: estende o span aberto do rótulo `X`; caso contrário
//!   registra aviso, emite o span pendente e abre um novo.
//! - `O`: nada.
//!
//! ## Início do span
//!
//! A região consumida por um token inclui os espaços que o precedem. Com a
//! regra do espaço inicial ligada, o início pula **todo** o espaço em branco
//! do começo da região (espaços duplos, tabulação, quebra de linha). As duas
//! estratégias usam a mesma regra ([`span_start`]).
//!
//! A variante agrupada ([`decode_clustered`]) reúne tokens contíguos do
//! mesmo rótulo antes de emitir, via [`cluster_tokens`]. Sobre uma sequência
//! BIO bem formada as duas estratégias produzem os mesmos spans.

use tracing::{debug, warn};

use crate::align::{AlignedToken, OffsetAligner};
use crate::config::{DecodeStrategy, NerConfig};
use crate::entity::{Entity, EntityType, Origin, DEFAULT_CONF, DEFAULT_PROB};
use crate::error::Result;
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::tagger::{LabeledToken, NerTag};

/// Grupo de tokens contíguos com o mesmo rótulo.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelCluster<L> {
    pub label: L,
    /// Início da região consumida pelo primeiro token (espaços inclusos).
    pub offset: usize,
    /// Início do primeiro token (sem o espaço que o precede).
    pub start: usize,
    /// Fim do último token.
    pub end: usize,
}

/// Agrupa tokens alinhados por rótulo.
///
/// `classify` recebe o rótulo bruto e devolve `(rótulo, inicia_novo)`; um
/// novo grupo começa quando o rótulo muda ou quando `inicia_novo` é
/// verdadeiro. Tokens sem rótulo não participam nem quebram grupos.
pub fn cluster_tokens<L, F>(tokens: &[AlignedToken], mut classify: F) -> Result<Vec<LabelCluster<L>>>
where
    L: PartialEq,
    F: FnMut(&str) -> Result<(L, bool)>,
{
    let mut clusters: Vec<LabelCluster<L>> = Vec::new();

    for token in tokens {
        let Some(raw_label) = token.label.as_deref() else {
            continue;
        };
        let (label, starts_new) = classify(raw_label)?;
        match clusters.last_mut() {
            Some(last) if !starts_new && last.label == label => {
                last.end = token.end();
            }
            _ => clusters.push(LabelCluster {
                label,
                offset: token.offset,
                start: token.token_start(),
                end: token.end(),
            }),
        }
    }

    Ok(clusters)
}

/// Um span decodificado: rótulo e região `[start, end)` em bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledSpan<L> {
    pub label: L,
    pub start: usize,
    pub end: usize,
}

/// Início de um span cuja região consumida é `[offset, end)`.
///
/// Com `skip_leading_space`, pula o espaço em branco do começo da região;
/// sem ele, devolve `offset`. Nunca passa de `end`.
pub fn span_start(text: &str, offset: usize, end: usize, skip_leading_space: bool) -> usize {
    if !skip_leading_space {
        return offset.min(end);
    }
    match text.get(offset..end) {
        Some(region) => offset + (region.len() - region.trim_start().len()),
        None => offset.min(end),
    }
}

/// Decodificação token a token, genérica no rótulo.
///
/// `classify` interpreta o rótulo bruto: `None` para fora de span,
/// `Some((rótulo, true))` para início e `Some((rótulo, false))` para
/// continuação. O primeiro erro de `classify` interrompe a decodificação.
pub fn decode_spans<L, F>(
    text: &str,
    aligned: &[AlignedToken],
    skip_leading_space: bool,
    mut classify: F,
) -> Result<Vec<LabeledSpan<L>>>
where
    L: PartialEq,
    F: FnMut(&str) -> Result<Option<(L, bool)>>,
{
    let open = |label: L, token: &AlignedToken| LabeledSpan {
        label,
        start: span_start(text, token.offset, token.end(), skip_leading_space),
        end: token.end(),
    };

    let mut spans = Vec::new();
    let mut current: Option<LabeledSpan<L>> = None;

    for token in aligned {
        // Sem rótulo: só o offset avança
        let Some(raw_label) = token.label.as_deref() else {
            continue;
        };
        let Some((label, is_begin)) = classify(raw_label)? else {
            continue;
        };

        match current.as_mut() {
            Some(span) if span.label == label && (!is_begin || span.end == token.offset) => {
                span.end = token.end();
                continue;
            }
            _ => {}
        }
        if !is_begin {
            warn!(
                token = %token.text,
                rotulo = raw_label,
                "continuação sem início correspondente, abrindo novo span"
            );
        }
        if let Some(span) = current.take() {
            spans.push(span);
        }
        current = Some(open(label, token));
    }

    spans.extend(current);
    Ok(spans)
}

/// Decodificação por agrupamento, genérica no rótulo: um span por grupo
/// rotulado, com o mesmo início de [`decode_spans`].
pub fn decode_clustered<L, F>(
    text: &str,
    aligned: &[AlignedToken],
    skip_leading_space: bool,
    mut classify: F,
) -> Result<Vec<LabeledSpan<L>>>
where
    L: PartialEq,
    F: FnMut(&str) -> Result<Option<(L, bool)>>,
{
    let clusters = cluster_tokens(aligned, |raw_label| {
        Ok(match classify(raw_label)? {
            Some((label, is_begin)) => (Some(label), is_begin),
            None => (None, false),
        })
    })?;

    Ok(clusters
        .into_iter()
        .filter_map(|cluster| {
            let start = span_start(text, cluster.offset, cluster.end, skip_leading_space);
            cluster.label.map(|label| LabeledSpan {
                label,
                start,
                end: cluster.end,
            })
        })
        .collect())
}

/// Interpreta um rótulo NER para o núcleo genérico.
fn classify_ner(label: &str) -> Result<Option<(EntityType, bool)>> {
    Ok(match NerTag::from_label(label)? {
        NerTag::Begin(t) => Some((t, true)),
        NerTag::Inside(t) => Some((t, false)),
        NerTag::Other => None,
    })
}

/// Decodificador de entidades, parametrizado pela configuração.
///
/// Guarda apenas parâmetros imutáveis; a mesma instância pode decodificar
/// textos diferentes em threads diferentes.
#[derive(Debug, Clone)]
pub struct SpanDecoder {
    skip_leading_space: bool,
    conf: f64,
    prob: f64,
    strategy: DecodeStrategy,
}

impl Default for SpanDecoder {
    fn default() -> Self {
        Self {
            skip_leading_space: true,
            conf: DEFAULT_CONF,
            prob: DEFAULT_PROB,
            strategy: DecodeStrategy::TokenByToken,
        }
    }
}

impl SpanDecoder {
    /// Decodificador padrão: token a token, regra do espaço inicial ligada,
    /// confiança e probabilidade padrão.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodificador com a estratégia, a regra do espaço inicial e os
    /// escores de `config`.
    pub fn from_config(config: &NerConfig) -> Self {
        Self {
            skip_leading_space: config.skip_leading_space,
            conf: config.default_conf,
            prob: config.default_prob,
            strategy: config.decode_strategy,
        }
    }

    /// Decodifica segundo a estratégia configurada.
    pub fn extract<S: AsRef<str>>(
        &self,
        text: &str,
        raw_tokens: &[S],
        labeled: &[LabeledToken],
        metrics: &mut impl MetricsSink,
    ) -> Result<Vec<Entity>> {
        match self.strategy {
            DecodeStrategy::TokenByToken => self.decode_with_metrics(text, raw_tokens, labeled, metrics),
            DecodeStrategy::Clustered => self.decode_clustered_with_metrics(text, raw_tokens, labeled, metrics),
        }
    }

    /// Decodificação token a token.
    pub fn decode<S: AsRef<str>>(
        &self,
        text: &str,
        raw_tokens: &[S],
        labeled: &[LabeledToken],
    ) -> Result<Vec<Entity>> {
        self.decode_with_metrics(text, raw_tokens, labeled, &mut NoopMetrics)
    }

    /// Decodificação token a token, registrando em `metrics` o tipo de cada
    /// entidade emitida.
    ///
    /// Um rótulo de tipo desconhecido interrompe a decodificação com
    /// `Error::UnknownEntityType`.
    pub fn decode_with_metrics<S: AsRef<str>>(
        &self,
        text: &str,
        raw_tokens: &[S],
        labeled: &[LabeledToken],
        metrics: &mut impl MetricsSink,
    ) -> Result<Vec<Entity>> {
        let aligned = OffsetAligner::align(raw_tokens, labeled);
        let spans = decode_spans(text, &aligned, self.skip_leading_space, classify_ner)?;
        let entities = spans
            .into_iter()
            .map(|span| self.emit(text, span, metrics))
            .collect::<Result<Vec<_>>>()?;

        debug!(entidades = entities.len(), tokens = aligned.len(), "decodificação concluída");
        Ok(entities)
    }

    /// Decodificação por agrupamento: uma entidade por grupo tipado.
    pub fn decode_clustered<S: AsRef<str>>(
        &self,
        text: &str,
        raw_tokens: &[S],
        labeled: &[LabeledToken],
    ) -> Result<Vec<Entity>> {
        self.decode_clustered_with_metrics(text, raw_tokens, labeled, &mut NoopMetrics)
    }

    /// Como [`decode_clustered`](Self::decode_clustered), registrando em
    /// `metrics` o tipo de cada entidade emitida.
    pub fn decode_clustered_with_metrics<S: AsRef<str>>(
        &self,
        text: &str,
        raw_tokens: &[S],
        labeled: &[LabeledToken],
        metrics: &mut impl MetricsSink,
    ) -> Result<Vec<Entity>> {
        let aligned = OffsetAligner::align(raw_tokens, labeled);
        decode_clustered(text, &aligned, self.skip_leading_space, classify_ner)?
            .into_iter()
            .map(|span| self.emit(text, span, metrics))
            .collect()
    }

    fn emit(&self, text: &str, span: LabeledSpan<EntityType>, metrics: &mut impl MetricsSink) -> Result<Entity> {
        let raw_name = match text.get(span.start..span.end) {
            Some(raw) => raw,
            None => {
                warn!(
                    inicio = span.start,
                    fim = span.end,
                    tamanho = text.len(),
                    "offsets da entidade fora do texto"
                );
                ""
            }
        };
        metrics.record_label(span.label.name());
        Entity::builder()
            .raw_name(raw_name)
            .entity_type(span.label)
            .offsets(span.start, span.end)
            .conf(self.conf)
            .prob(self.prob)
            .origin(Origin::System)
            .build()
    }
}
