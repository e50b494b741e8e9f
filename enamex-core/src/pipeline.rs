//! # Pipeline NER
//!
//! Liga os estágios de uma extração:
//!
//! 1. troca de `\n` por espaço (opcional, preserva os offsets);
//! 2. tokenização ([`TokenizeFn`], por padrão [`tokenize_word_bounds`]);
//! 3. índices de léxico e vetores de features ([`crate::features`]);
//! 4. chamada ao tagger externo ([`SequenceTagger`]);
//! 5. leitura da saída e decodificação em entidades ([`SpanDecoder`]).
//!
//! Cada idioma é um [`LanguageParser`] que só fornece o tagger e o
//! tokenizador; o decodificador e o léxico são compartilhados. O registro
//! [`NerParsers`] despacha por código de idioma e processa lotes em paralelo
//! com `rayon`.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use crate::config::NerConfig;
use crate::document::Paragraph;
use crate::entity::{Entity, Sense};
use crate::error::{Error, Result};
use crate::features::to_feature_vectors;
use crate::lexicon::NerLexicon;
use crate::metrics::{LabelCounts, MetricsSink, NoopMetrics};
use crate::reconcile::{escape_xml, EntityReconciler, CORPUS_FOOTER, CORPUS_HEADER};
use crate::span::SpanDecoder;
use crate::tagger::{parse_tagger_output, SequenceTagger};
use crate::temporal::TemporalLexicon;
use crate::tokenizer::{tokenize_word_bounds, Token};

/// Tokenizador injetável: texto → tokens com espaços inclusos.
///
/// Qualquer `Fn(&str) -> Vec<Token>` serve, inclusive closures que capturam
/// estado; o `Arc` deixa parsers de idiomas diferentes compartilharem o mesmo.
pub type TokenizeFn = Arc<dyn Fn(&str) -> Vec<Token> + Send + Sync>;

/// Extrator de entidades de um idioma.
pub trait NerParser: Send + Sync {
    /// Código ISO do idioma atendido.
    fn language(&self) -> &str;

    /// Como [`extract`](Self::extract), registrando em `metrics` o tipo de
    /// cada entidade emitida.
    fn extract_with_metrics(&self, text: &str, metrics: &mut dyn MetricsSink) -> Result<Vec<Entity>>;

    /// Entidades do texto, offsets em bytes, em ordem.
    fn extract(&self, text: &str) -> Result<Vec<Entity>> {
        self.extract_with_metrics(text, &mut NoopMetrics)
    }
}

/// Parser de um idioma sobre um tagger qualquer.
pub struct LanguageParser<T: SequenceTagger> {
    tagger: T,
    lexicon: Arc<NerLexicon>,
    temporal: Arc<TemporalLexicon>,
    tokenize: TokenizeFn,
    config: NerConfig,
    decoder: SpanDecoder,
}

impl<T: SequenceTagger> LanguageParser<T> {
    /// Parser com a configuração padrão no idioma `language`, o tokenizador
    /// por fronteiras de palavra e o léxico temporal embutido.
    pub fn new(language: impl Into<String>, tagger: T, lexicon: Arc<NerLexicon>) -> Self {
        let config = NerConfig {
            language: language.into(),
            ..NerConfig::default()
        };
        Self {
            tagger,
            lexicon,
            temporal: Arc::new(TemporalLexicon::new()),
            tokenize: Arc::new(tokenize_word_bounds),
            decoder: SpanDecoder::from_config(&config),
            config,
        }
    }

    /// Substitui a configuração; o idioma passa a ser o da configuração.
    pub fn with_config(mut self, config: NerConfig) -> Result<Self> {
        config.validate()?;
        self.decoder = SpanDecoder::from_config(&config);
        self.config = config;
        Ok(self)
    }

    /// Troca o tokenizador padrão. Os tokens devem cobrir o texto inteiro,
    /// espaços inclusos, para que os offsets fiquem exatos.
    pub fn with_tokenizer<F>(mut self, tokenize: F) -> Self
    where
        F: Fn(&str) -> Vec<Token> + Send + Sync + 'static,
    {
        self.tokenize = Arc::new(tokenize);
        self
    }

    /// Compartilha um tokenizador já embrulhado em `Arc`.
    pub fn with_shared_tokenizer(mut self, tokenize: TokenizeFn) -> Self {
        self.tokenize = tokenize;
        self
    }

    /// Léxico de meses e dias usado nas features de data.
    pub fn with_temporal_lexicon(mut self, temporal: Arc<TemporalLexicon>) -> Self {
        self.temporal = temporal;
        self
    }

    pub fn config(&self) -> &NerConfig {
        &self.config
    }
}

impl<T: SequenceTagger> NerParser for LanguageParser<T> {
    fn language(&self) -> &str {
        &self.config.language
    }

    fn extract_with_metrics(&self, text: &str, mut metrics: &mut dyn MetricsSink) -> Result<Vec<Entity>> {
        let started = Instant::now();
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
        let entities = self.decoder.extract(&text, &tokens, &labeled, &mut metrics)?;

        debug!(
            idioma = %self.config.language,
            tokens = tokens.len(),
            entidades = entities.len(),
            ms = started.elapsed().as_millis() as u64,
            "extração concluída"
        );
        Ok(entities)
    }
}

/// Registro de parsers por código de idioma.
#[derive(Default)]
pub struct NerParsers {
    parsers: BTreeMap<String, Box<dyn NerParser>>,
}

impl NerParsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registro padrão: inglês e francês sobre o mesmo léxico.
    pub fn with_taggers<E, F>(lexicon: Arc<NerLexicon>, english: E, french: F) -> Self
    where
        E: SequenceTagger + 'static,
        F: SequenceTagger + 'static,
    {
        let mut parsers = Self::new();
        parsers.register(LanguageParser::new("en", english, Arc::clone(&lexicon)));
        parsers.register(LanguageParser::new("fr", french, lexicon));
        parsers
    }

    /// Registra (ou substitui) o parser do idioma que ele declara.
    pub fn register(&mut self, parser: impl NerParser + 'static) {
        self.parsers.insert(parser.language().to_string(), Box::new(parser));
    }

    /// Parser registrado para o idioma, se houver.
    pub fn get(&self, language: &str) -> Option<&dyn NerParser> {
        self.parsers.get(language).map(|p| p.as_ref())
    }

    /// Idiomas registrados, em ordem alfabética.
    pub fn languages(&self) -> Vec<&str> {
        self.parsers.keys().map(String::as_str).collect()
    }

    fn parser(&self, language: &str) -> Result<&dyn NerParser> {
        self.get(language)
            .ok_or_else(|| Error::UnsupportedLanguage(language.to_string()))
    }

    /// Extrai as entidades de `text` no idioma indicado.
    ///
    /// Texto vazio resulta em lista vazia sem consultar o registro.
    pub fn extract(&self, text: &str, language: &str) -> Result<Vec<Entity>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        self.parser(language)?.extract(text)
    }

    /// Um resultado por texto, na ordem de entrada; textos processados em paralelo.
    pub fn extract_batch<S>(&self, texts: &[S], language: &str) -> Result<Vec<Vec<Entity>>>
    where
        S: AsRef<str> + Sync,
    {
        let parser = self.parser(language)?;
        texts.par_iter().map(|text| parser.extract(text.as_ref())).collect()
    }

    /// Como [`extract_batch`](Self::extract_batch), somando as contagens de
    /// rótulos de cada texto.
    pub fn extract_batch_with_counts<S>(&self, texts: &[S], language: &str) -> Result<(Vec<Vec<Entity>>, LabelCounts)>
    where
        S: AsRef<str> + Sync,
    {
        let parser = self.parser(language)?;
        let results: Vec<(Vec<Entity>, LabelCounts)> = texts
            .par_iter()
            .map(|text| {
                let mut counts = LabelCounts::default();
                let entities = parser.extract_with_metrics(text.as_ref(), &mut counts)?;
                Ok((entities, counts))
            })
            .collect::<Result<_>>()?;

        let mut total = LabelCounts::default();
        let mut batches = Vec::with_capacity(results.len());
        for (entities, counts) in results {
            total.merge(&counts);
            batches.push(entities);
        }
        Ok((batches, total))
    }
}

/// Associa a cada entidade o primeiro sentido contido nela.
///
/// A busca recomeça do último sentido usado, pois ambas as listas estão em
/// ordem de offset. Sentidos sem posição são ignorados; entidades sem
/// sentido contido ficam como estão.
pub fn attach_senses(entities: Vec<Entity>, senses: &[Sense]) -> Vec<Entity> {
    let mut sense_pos = 0;
    entities
        .into_iter()
        .map(|entity| {
            let found = senses.iter().enumerate().skip(sense_pos).find(|(_, sense)| {
                sense
                    .offsets
                    .is_some_and(|offsets| entity.offsets().contains(&offsets))
            });
            match found {
                Some((i, sense)) => {
                    sense_pos = i;
                    entity.with_sense(Some(sense.clone()))
                }
                None => entity,
            }
        })
        .collect()
}

/// Dados de treino para um texto: um `<p>` por linha não vazia, sentenças
/// segmentadas e as entidades do parser marcadas com `<ENAMEX>`.
///
/// Os identificadores seguem a linha de origem (`P3`) e a posição da
/// sentença (`P3E0`).
pub fn create_training_text(parser: &dyn NerParser, text: &str) -> Result<String> {
    let reconciler = EntityReconciler {
        mark_system_layer: false,
    };
    let mut out = String::new();

    for (p, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entities = parser.extract(line)?;

        let mut paragraph = Paragraph::segment(line);
        paragraph.id = Some(format!("P{p}"));
        paragraph.language = Some(parser.language().to_string());
        for (s, sentence) in paragraph.sentences.iter_mut().enumerate() {
            sentence.id = Some(format!("P{p}E{s}"));
        }

        out.push_str(&reconciler.reconcile_paragraph(&paragraph, &entities));
    }
    Ok(out)
}

/// Documento de treino completo, com cabeçalho e rodapé do corpus.
pub fn create_training(parser: &dyn NerParser, text: &str, name: &str) -> Result<String> {
    let mut out = String::from(CORPUS_HEADER);
    out.push_str("\t\t<document name=\"");
    out.push_str(&escape_xml(&name.replace(' ', "_")));
    out.push_str("\">\n");
    out.push_str(&create_training_text(parser, text)?);
    out.push_str("\t\t</document>\n");
    out.push_str(CORPUS_FOOTER);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecodeStrategy;
    use crate::entity::{EntityType, OffsetPosition};
    use crate::lexicon::LexiconKind;

    /// Tagger de teste: rotula pela primeira coluna, `O` para o resto.
    fn fixture_tagger(labels: &'static [(&'static str, &'static str)]) -> impl SequenceTagger {
        move |input: &str| -> Result<String> {
            let rows: Vec<String> = input
                .lines()
                .filter_map(|line| line.split_whitespace().next())
                .map(|token| {
                    let label = labels
                        .iter()
                        .find(|(t, _)| *t == token)
                        .map_or("O", |(_, l)| *l);
                    format!("{token} {label}")
                })
                .collect();
            Ok(rows.join("\n"))
        }
    }

    const LOCATIONS: &[(&str, &str)] = &[
        ("Austria", "B-LOCATION"),
        ("Germany", "B-LOCATION"),
        ("Paris", "B-LOCATION"),
        ("New", "B-LOCATION"),
        ("York", "LOCATION"),
    ];

    fn english() -> LanguageParser<impl SequenceTagger> {
        LanguageParser::new("en", fixture_tagger(LOCATIONS), Arc::new(NerLexicon::new()))
    }

    fn spans(entities: &[Entity]) -> Vec<(&str, usize, usize)> {
        entities
            .iter()
            .map(|e| (e.raw_name(), e.offset_start(), e.offset_end()))
            .collect()
    }

    #[test]
    fn test_language_parser_extract() {
        let text = "Austria fought the enemies with Germany.";
        let entities = english().extract(text).unwrap();
        assert_eq!(spans(&entities), vec![("Austria", 0, 7), ("Germany", 32, 39)]);
        assert!(entities.iter().all(|e| e.entity_type() == EntityType::Location));
        assert!(entities.iter().all(|e| e.matches_text(text)));
    }

    #[test]
    fn test_newlines_replaced() {
        let entities = english().extract("New\nYork is big").unwrap();
        assert_eq!(spans(&entities), vec![("New York", 0, 8)]);

        let config = NerConfig {
            replace_newlines: false,
            ..NerConfig::default()
        };
        let parser = english().with_config(config).unwrap();
        let entities = parser.extract("New\nYork is big").unwrap();
        assert_eq!(spans(&entities), vec![("New\nYork", 0, 8)]);
    }

    #[test]
    fn test_clustered_strategy_from_config() {
        let config = NerConfig {
            decode_strategy: DecodeStrategy::Clustered,
            ..NerConfig::default()
        };
        let parser = english().with_config(config).unwrap();
        let entities = parser.extract("Austria fought the enemies with Germany.").unwrap();
        assert_eq!(spans(&entities), vec![("Austria", 0, 7), ("Germany", 32, 39)]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = NerConfig {
            default_conf: 1.5,
            ..NerConfig::default()
        };
        assert!(matches!(english().with_config(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_text() {
        assert!(english().extract("").unwrap().is_empty());
        assert!(english().extract("   ").unwrap().is_empty());
    }

    #[test]
    fn test_tagger_failure_propagates() {
        let failing = |_: &str| -> Result<String> { Err(Error::tagger("modelo ausente")) };
        let parser = LanguageParser::new("en", failing, Arc::new(NerLexicon::empty()));
        assert!(matches!(parser.extract("Austria"), Err(Error::Tagger(_))));
    }

    #[test]
    fn test_lexicon_reaches_tagger_input() {
        // Rotula como local só quando a coluna de léxico de locais está ligada.
        let by_lexicon = |input: &str| -> Result<String> {
            let rows: Vec<String> = input
                .lines()
                .map(|line| {
                    let cols: Vec<&str> = line.split(' ').collect();
                    let label = if cols[16] == "1" { "B-LOCATION" } else { "O" };
                    format!("{} {label}", cols[0])
                })
                .collect();
            Ok(rows.join("\n"))
        };
        let lexicon = NerLexicon::empty().with_phrases(LexiconKind::Location, ["austria"]);
        let parser = LanguageParser::new("en", by_lexicon, Arc::new(lexicon));

        let entities = parser.extract("Austria and Hungary").unwrap();
        assert_eq!(spans(&entities), vec![("Austria", 0, 7)]);
    }

    #[test]
    fn test_capturing_tokenizer() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let parser = english().with_tokenizer(move |text: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            tokenize_word_bounds(text)
        });

        let entities = parser.extract("Paris and Germany.").unwrap();
        assert_eq!(spans(&entities), vec![("Paris", 0, 5), ("Germany", 10, 17)]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry() {
        let lexicon = Arc::new(NerLexicon::new());
        let parsers = NerParsers::with_taggers(lexicon, fixture_tagger(LOCATIONS), fixture_tagger(LOCATIONS));
        assert_eq!(parsers.languages(), vec!["en", "fr"]);

        let entities = parsers.extract("Paris est belle.", "fr").unwrap();
        assert_eq!(spans(&entities), vec![("Paris", 0, 5)]);

        assert!(parsers.extract("", "de").unwrap().is_empty());
        assert!(matches!(
            parsers.extract("Berlin", "de"),
            Err(Error::UnsupportedLanguage(lang)) if lang == "de"
        ));
    }

    #[test]
    fn test_batch_keeps_order() {
        let mut parsers = NerParsers::new();
        parsers.register(english());
        let texts = vec![
            "Austria fought.".to_string(),
            "Nothing here.".to_string(),
            "Paris and Germany.".to_string(),
        ];

        let batches = parsers.extract_batch(&texts, "en").unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(spans(&batches[0]), vec![("Austria", 0, 7)]);
        assert!(batches[1].is_empty());
        assert_eq!(spans(&batches[2]), vec![("Paris", 0, 5), ("Germany", 10, 17)]);

        let (again, counts) = parsers.extract_batch_with_counts(&texts, "en").unwrap();
        assert_eq!(again, batches);
        assert_eq!(counts.get("LOCATION"), 3);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_attach_senses() {
        let entity = |raw: &str, start, end| {
            Entity::builder()
                .raw_name(raw)
                .entity_type(EntityType::Location)
                .offsets(start, end)
                .build()
                .unwrap()
        };
        let sense = |fine: &str, start, end| Sense {
            offsets: Some(OffsetPosition { start, end }),
            ..Sense::new("location", fine)
        };

        let entities = vec![entity("Austria", 0, 7), entity("the enemies", 15, 26), entity("Germany", 32, 39)];
        let senses = vec![
            sense("country/N1", 0, 7),
            Sense::new("floating", "no/N1"),
            sense("nation/N1", 32, 39),
        ];

        let merged = attach_senses(entities, &senses);
        let fine: Vec<Option<&str>> = merged
            .iter()
            .map(|e| e.sense().and_then(|s| s.fine_sense.as_deref()))
            .collect();
        assert_eq!(fine, vec![Some("country/N1"), None, Some("nation/N1")]);
    }

    #[test]
    fn test_create_training() {
        let text = "Austria fought. Germany won.\n\nParis";
        let xml = create_training(&english(), text, "my doc").unwrap();

        assert!(xml.starts_with(CORPUS_HEADER));
        assert!(xml.contains("\t\t<document name=\"my_doc\">\n"));
        assert!(xml.contains("\t\t\t<p xml:lang=\"en\" xml:id=\"P0\">\n"));
        assert!(xml.contains(
            "<sentence xml:id=\"P0E0\"><ENAMEX type=\"LOCATION\">Austria</ENAMEX> fought. </sentence>"
        ));
        assert!(xml.contains(
            "<sentence xml:id=\"P0E1\"><ENAMEX type=\"LOCATION\">Germany</ENAMEX> won.</sentence>"
        ));
        assert!(xml.contains("<p xml:lang=\"en\" xml:id=\"P2\">"));
        assert!(!xml.contains("xml:id=\"P1\""));
        assert!(xml.ends_with(CORPUS_FOOTER));
    }
}
