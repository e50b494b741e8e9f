//! # Documentos, Parágrafos e Sentenças
//!
//! Contêineres ordenados do corpus anotado. As entidades de uma sentença
//! usam offsets locais à sentença; [`Paragraph::entities`] as devolve em
//! coordenadas do parágrafo.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

use crate::entity::{Entity, OffsetPosition};
use crate::tokenizer::Token;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sentence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    raw_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offsets: Option<OffsetPosition>,
    #[serde(default)]
    entities: Vec<Entity>,
    #[serde(default, skip)]
    tokens: Vec<Token>,
    /// Para cada token, o índice da entidade que o cobre (`None` se nenhuma).
    #[serde(default, skip)]
    entity_index_list: Vec<Option<usize>>,
}

impl Sentence {
    pub fn new(raw_value: impl Into<String>) -> Self {
        Self {
            raw_value: raw_value.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.set_entities(entities);
        self
    }

    pub fn raw_value(&self) -> &str {
        &self.raw_value
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Define as entidades (offsets locais), mantidas em ordem natural.
    ///
    /// Invalida a lista de índices: chame [`set_tokens`](Self::set_tokens) de novo.
    pub fn set_entities(&mut self, mut entities: Vec<Entity>) {
        entities.sort();
        self.entities = entities;
        self.entity_index_list.clear();
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn entity_index_list(&self) -> &[Option<usize>] {
        &self.entity_index_list
    }

    /// Guarda a tokenização e liga cada token à entidade que o contém.
    ///
    /// As posições dos tokens são recalculadas somando os comprimentos.
    /// Um token parcialmente dentro de uma entidade é registrado como
    /// desalinhado e fica sem entidade.
    pub fn set_tokens(&mut self, tokens: Vec<Token>) {
        let mut index_list = Vec::with_capacity(tokens.len());
        let mut pos = 0;

        for token in &tokens {
            let start = pos;
            let end = start + token.text.len();
            pos = end;

            let covering = self
                .entities
                .iter()
                .position(|e| e.offset_start() <= start && end <= e.offset_end());
            if covering.is_none() {
                if let Some(e) = self
                    .entities
                    .iter()
                    .find(|e| start < e.offset_end() && e.offset_start() < end)
                {
                    warn!(
                        token = %token.text,
                        inicio = start,
                        entidade = e.raw_name(),
                        "token atravessa a fronteira de uma entidade"
                    );
                }
            }
            index_list.push(covering);
        }

        self.tokens = tokens;
        self.entity_index_list = index_list;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
}

impl Paragraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Segmenta `text` em sentenças (fronteiras Unicode UAX #29).
    ///
    /// As sentenças cobrem o texto inteiro, espaços finais inclusos, de modo
    /// que `segment(t).text() == t`.
    pub fn segment(text: &str) -> Self {
        let sentences = text
            .split_sentence_bound_indices()
            .map(|(start, raw)| {
                let mut sentence = Sentence::new(raw);
                sentence.offsets = Some(OffsetPosition {
                    start,
                    end: start + raw.len(),
                });
                sentence
            })
            .collect();
        Self {
            sentences,
            ..Self::default()
        }
    }

    pub fn add_sentence(&mut self, sentence: Sentence) {
        self.sentences.push(sentence);
    }

    /// Texto do parágrafo: concatenação das sentenças.
    pub fn text(&self) -> String {
        self.sentences.iter().map(Sentence::raw_value).collect()
    }

    /// Início de cada sentença no texto do parágrafo.
    pub fn sentence_starts(&self) -> Vec<usize> {
        let mut starts = Vec::with_capacity(self.sentences.len());
        let mut pos = 0;
        for sentence in &self.sentences {
            starts.push(pos);
            pos += sentence.raw_value().len();
        }
        starts
    }

    /// Todas as entidades, em coordenadas do parágrafo e em ordem natural.
    pub fn entities(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .sentences
            .iter()
            .zip(self.sentence_starts())
            .flat_map(|(sentence, start)| sentence.entities().iter().map(move |e| e.rebased(start)))
            .collect();
        entities.sort();
        entities
    }

    /// Quantidade de entidades por tipo.
    pub fn entity_type_frequencies(&self) -> BTreeMap<String, u64> {
        let mut frequencies = BTreeMap::new();
        for sentence in &self.sentences {
            for entity in sentence.entities() {
                *frequencies.entry(entity.entity_type().name().to_string()).or_insert(0) += 1;
            }
        }
        frequencies
    }
}

/// Documento do corpus de treino.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingDocument {
    pub name: String,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
}

impl TrainingDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            paragraphs: Vec::new(),
        }
    }

    pub fn add_paragraph(&mut self, paragraph: Paragraph) {
        self.paragraphs.push(paragraph);
    }

    pub fn sentences(&self) -> impl Iterator<Item = &Sentence> {
        self.paragraphs.iter().flat_map(|p| p.sentences.iter())
    }
}
