//! # Entidades Nomeadas
//!
//! Representação comum de uma menção de entidade, venha ela do tagger
//! (`Origin::System`) ou de uma anotação manual (`Origin::User`).
//!
//! ## Tipos de Entidade
//!
//! | Tipo            | Exemplos                               |
//! |-----------------|----------------------------------------|
//! | PERSON          | Patrice Lopez, Marie Curie             |
//! | LOCATION        | Austria, New York                      |
//! | ORGANISATION    | INRIA, United Nations                  |
//! | PERIOD          | February 10, 1942-07-27                |
//! | ATHLETIC_TEAM   | Manchester United (alias `sport_team`) |
//! | ...             | 27 tipos no total, `UNKNOWN` incluso   |
//!
//! ## Offsets
//!
//! Os offsets são **índices de byte** no texto UTF-8 original, fim exclusivo,
//! a mesma convenção de [`crate::tokenizer::Token`]. Assim
//! `&text[e.offset_start()..e.offset_end()] == e.raw_name()` sempre que o
//! alinhamento estiver correto.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Intervalo `[start, end)` em bytes do texto original.
///
/// A ausência de posição (o `-1` de outras implementações) é representada
/// por `Option<OffsetPosition>` nos tipos que a admitem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OffsetPosition {
    pub start: usize,
    pub end: usize,
}

impl OffsetPosition {
    /// Cria a posição validando `start <= end`.
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidOffsets { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Desloca o intervalo inteiro (ex: sentença → parágrafo).
    pub fn shifted(&self, delta: usize) -> Self {
        Self {
            start: self.start + delta,
            end: self.end + delta,
        }
    }

    /// `other` está inteiramente dentro deste intervalo.
    pub fn contains(&self, other: &OffsetPosition) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Recorta o trecho correspondente, se os limites forem válidos para `text`.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end)
    }
}

impl fmt::Display for OffsetPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.start, self.end)
    }
}

/// Conjunto fechado de tipos de entidade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntityType {
    Unknown,
    Person,
    Location,
    Organisation,
    Acronym,
    Animal,
    Artifact,
    Business,
    Institution,
    Measure,
    Award,
    Concept,
    Conceptual,
    Creation,
    Event,
    Legal,
    Identifier,
    Installation,
    Media,
    National,
    Substance,
    Plant,
    Period,
    Title,
    PersonType,
    Website,
    AthleticTeam,
}

impl EntityType {
    /// Todos os tipos, na ordem de declaração.
    pub const ALL: [EntityType; 27] = [
        EntityType::Unknown,
        EntityType::Person,
        EntityType::Location,
        EntityType::Organisation,
        EntityType::Acronym,
        EntityType::Animal,
        EntityType::Artifact,
        EntityType::Business,
        EntityType::Institution,
        EntityType::Measure,
        EntityType::Award,
        EntityType::Concept,
        EntityType::Conceptual,
        EntityType::Creation,
        EntityType::Event,
        EntityType::Legal,
        EntityType::Identifier,
        EntityType::Installation,
        EntityType::Media,
        EntityType::National,
        EntityType::Substance,
        EntityType::Plant,
        EntityType::Period,
        EntityType::Title,
        EntityType::PersonType,
        EntityType::Website,
        EntityType::AthleticTeam,
    ];

    /// Nome canônico usado nos rótulos do tagger e no atributo `type` do ENAMEX.
    pub fn name(&self) -> &'static str {
        match self {
            EntityType::Unknown => "UNKNOWN",
            EntityType::Person => "PERSON",
            EntityType::Location => "LOCATION",
            EntityType::Organisation => "ORGANISATION",
            EntityType::Acronym => "ACRONYM",
            EntityType::Animal => "ANIMAL",
            EntityType::Artifact => "ARTIFACT",
            EntityType::Business => "BUSINESS",
            EntityType::Institution => "INSTITUTION",
            EntityType::Measure => "MEASURE",
            EntityType::Award => "AWARD",
            EntityType::Concept => "CONCEPT",
            EntityType::Conceptual => "CONCEPTUAL",
            EntityType::Creation => "CREATION",
            EntityType::Event => "EVENT",
            EntityType::Legal => "LEGAL",
            EntityType::Identifier => "IDENTIFIER",
            EntityType::Installation => "INSTALLATION",
            EntityType::Media => "MEDIA",
            EntityType::National => "NATIONAL",
            EntityType::Substance => "SUBSTANCE",
            EntityType::Plant => "PLANT",
            EntityType::Period => "PERIOD",
            EntityType::Title => "TITLE",
            EntityType::PersonType => "PERSON_TYPE",
            EntityType::Website => "WEBSITE",
            EntityType::AthleticTeam => "ATHLETIC_TEAM",
        }
    }

    /// Variante tolerante: rótulos desconhecidos viram `Unknown`.
    ///
    /// Deve ser chamada explicitamente; o caminho padrão ([`FromStr`]) falha.
    pub fn parse_or_unknown(label: &str) -> Self {
        label.parse().unwrap_or(EntityType::Unknown)
    }

    /// Mapeia os sentidos do corpus Idilia (`person/N1`, `location/N1`, ...).
    /// Sentidos não listados caem em `Unknown`.
    pub fn from_idilia_sense(sense: &str) -> Self {
        match sense {
            "person/N1" => EntityType::Person,
            "location/N1" => EntityType::Location,
            "organizational_unit/N1" => EntityType::Organisation,
            "acronym/N1" => EntityType::Acronym,
            "animal/N1" => EntityType::Animal,
            "artifact/N1" => EntityType::Artifact,
            "business/N1" => EntityType::Business,
            "institution/N2" => EntityType::Institution,
            "measure/N3" => EntityType::Measure,
            "award/N2" => EntityType::Award,
            "concept/N1" => EntityType::Concept,
            "conceptual/J1" => EntityType::Conceptual,
            "creation/N2" => EntityType::Creation,
            "event/N1" => EntityType::Event,
            "identifier/N1" => EntityType::Identifier,
            "installation/N2" => EntityType::Installation,
            "media/N1" => EntityType::Media,
            "national/J3" => EntityType::National,
            "naturally-occurring_substance/N1" => EntityType::Substance,
            "plant/N2" => EntityType::Plant,
            "time_period/N1" => EntityType::Period,
            "title/N6" => EntityType::Title,
            "type_of_person/N1" => EntityType::PersonType,
            "website/N1" => EntityType::Website,
            "athletic_team/N1" => EntityType::AthleticTeam,
            _ => EntityType::Unknown,
        }
    }
}

impl FromStr for EntityType {
    type Err = Error;

    /// Comparação sem distinção de caixa, com os aliases históricos.
    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        let canonical = match upper.as_str() {
            "SPORT_TEAM" => "ATHLETIC_TEAM",
            other => other,
        };
        EntityType::ALL
            .iter()
            .find(|t| t.name() == canonical)
            .copied()
            .ok_or_else(|| Error::unknown_entity_type(s))
    }
}

impl TryFrom<String> for EntityType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EntityType> for String {
    fn from(t: EntityType) -> Self {
        t.name().to_string()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Origem da anotação.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Produzida pelo decodificador a partir da saída do tagger.
    #[default]
    System,
    /// Fornecida externamente (anotação manual / gold).
    User,
}

/// Caixa delimitadora no documento de origem (PDF).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Sentido associado a uma entidade (WordNet grosso/fino).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sense {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coarse_sense: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fine_sense: Option<String>,
    #[serde(default)]
    pub conf: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Posição do sentido no texto; usada para associá-lo à entidade que o contém.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offsets: Option<OffsetPosition>,
}

impl Sense {
    pub fn new(coarse: impl Into<String>, fine: impl Into<String>) -> Self {
        Self {
            coarse_sense: Some(coarse.into()),
            fine_sense: Some(fine.into()),
            ..Self::default()
        }
    }
}

/// Confiança padrão quando o tagger não informa nenhuma.
pub const DEFAULT_CONF: f64 = 0.8;
/// Probabilidade padrão quando o tagger não informa nenhuma.
pub const DEFAULT_PROB: f64 = 1.0;

/// Uma menção de entidade com offsets exatos.
///
/// Imutável depois de construída por [`EntityBuilder`]. Duas entidades são
/// iguais quando têm os mesmos offsets; a ordem natural é `(início, fim)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "EntityRecord", into = "EntityRecord")]
pub struct Entity {
    raw_name: String,
    normalised_name: Option<String>,
    entity_type: EntityType,
    sub_types: Vec<String>,
    offsets: OffsetPosition,
    prob: f64,
    conf: f64,
    origin: Origin,
    bounding_boxes: Vec<BoundingBox>,
    is_acronym: bool,
    sense: Option<Sense>,
}

impl Entity {
    pub fn builder() -> EntityBuilder {
        EntityBuilder::default()
    }

    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    pub fn normalised_name(&self) -> Option<&str> {
        self.normalised_name.as_deref()
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn sub_types(&self) -> &[String] {
        &self.sub_types
    }

    pub fn offsets(&self) -> OffsetPosition {
        self.offsets
    }

    pub fn offset_start(&self) -> usize {
        self.offsets.start
    }

    pub fn offset_end(&self) -> usize {
        self.offsets.end
    }

    pub fn prob(&self) -> f64 {
        self.prob
    }

    pub fn conf(&self) -> f64 {
        self.conf
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn bounding_boxes(&self) -> &[BoundingBox] {
        &self.bounding_boxes
    }

    pub fn is_acronym(&self) -> bool {
        self.is_acronym
    }

    pub fn sense(&self) -> Option<&Sense> {
        self.sense.as_ref()
    }

    /// Cópia com os offsets deslocados de `delta` bytes.
    pub fn rebased(&self, delta: usize) -> Entity {
        Entity {
            offsets: self.offsets.shifted(delta),
            ..self.clone()
        }
    }

    /// Substitui o sentido associado.
    pub fn with_sense(self, sense: Option<Sense>) -> Entity {
        Entity { sense, ..self }
    }

    /// Mesmo intervalo exato que `other`.
    pub fn same_span(&self, other: &Entity) -> bool {
        self.offsets == other.offsets
    }

    /// Confere se o trecho do texto nos offsets bate com `raw_name`.
    pub fn matches_text(&self, text: &str) -> bool {
        self.offsets.slice(text) == Some(self.raw_name.as_str())
    }

    /// Exportação em TEI standoff.
    pub fn to_tei(&self, n: usize) -> String {
        let mut out = format!(
            "<stf xml:id=\"ner-{n}\" type=\"ne\" who=\"nerd\" when=\"\"><ptr target=\"id,{},{}\" />",
            self.offsets.start, self.offsets.end
        );
        if self.entity_type == EntityType::Person {
            out.push_str("<person>");
            out.push_str(&crate::reconcile::escape_xml(&self.raw_name));
            out.push_str("</person>");
        }
        out.push_str("</stf>");
        out
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.offsets == other.offsets
    }
}

impl Eq for Entity {}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.offsets
            .start
            .cmp(&other.offsets.start)
            .then(self.offsets.end.cmp(&other.offsets.end))
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t", self.raw_name)?;
        if let Some(normalised) = &self.normalised_name {
            write!(f, "{normalised}\t")?;
        }
        write!(f, "{}\t", self.entity_type)?;
        for sub_type in &self.sub_types {
            write!(f, "{sub_type}\t")?;
        }
        write!(f, "{}\t", self.offsets)?;
        if let Some(fine) = self.sense.as_ref().and_then(|s| s.fine_sense.as_ref()) {
            write!(f, "{fine}\t")?;
        }
        Ok(())
    }
}

/// Builder que valida offsets e tipo antes de produzir a [`Entity`].
#[derive(Debug, Clone, Default)]
pub struct EntityBuilder {
    raw_name: String,
    normalised_name: Option<String>,
    entity_type: Option<EntityType>,
    sub_types: Vec<String>,
    offsets: Option<(usize, usize)>,
    prob: Option<f64>,
    conf: Option<f64>,
    origin: Origin,
    bounding_boxes: Vec<BoundingBox>,
    is_acronym: bool,
    sense: Option<Sense>,
}

impl EntityBuilder {
    pub fn raw_name(mut self, raw: impl Into<String>) -> Self {
        self.raw_name = raw.into();
        self
    }

    pub fn normalised_name(mut self, name: impl Into<String>) -> Self {
        self.normalised_name = Some(name.into());
        self
    }

    pub fn entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    /// Resolve o tipo a partir de texto livre; falha rápido se desconhecido.
    pub fn type_from_str(mut self, label: &str) -> Result<Self> {
        self.entity_type = Some(label.parse()?);
        Ok(self)
    }

    pub fn sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_types.push(sub_type.into());
        self
    }

    pub fn offsets(mut self, start: usize, end: usize) -> Self {
        self.offsets = Some((start, end));
        self
    }

    pub fn prob(mut self, prob: f64) -> Self {
        self.prob = Some(prob);
        self
    }

    pub fn conf(mut self, conf: f64) -> Self {
        self.conf = Some(conf);
        self
    }

    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn bounding_box(mut self, bbox: BoundingBox) -> Self {
        self.bounding_boxes.push(bbox);
        self
    }

    pub fn acronym(mut self, is_acronym: bool) -> Self {
        self.is_acronym = is_acronym;
        self
    }

    pub fn sense(mut self, sense: Sense) -> Self {
        self.sense = Some(sense);
        self
    }

    /// Valida e produz a entidade.
    ///
    /// Falha sem tipo (`MissingEntityType`), sem offsets (`MissingOffsets`),
    /// com offsets invertidos (`InvalidOffsets`) ou com `prob`/`conf` fora de
    /// `[0, 1]` ou NaN (`InvalidScore`).
    pub fn build(self) -> Result<Entity> {
        let entity_type = self.entity_type.ok_or(Error::MissingEntityType)?;
        let (start, end) = self
            .offsets
            .ok_or_else(|| Error::MissingOffsets(self.raw_name.clone()))?;
        let offsets = OffsetPosition::new(start, end)?;
        Ok(Entity {
            raw_name: self.raw_name,
            normalised_name: self.normalised_name,
            entity_type,
            sub_types: self.sub_types,
            offsets,
            prob: score("prob", self.prob.unwrap_or(DEFAULT_PROB))?,
            conf: score("conf", self.conf.unwrap_or(DEFAULT_CONF))?,
            origin: self.origin,
            bounding_boxes: self.bounding_boxes,
            is_acronym: self.is_acronym,
            sense: self.sense,
        })
    }
}

fn score(field: &'static str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::InvalidScore { field, value })
    }
}

// === Serialização de intercâmbio ===

/// Forma serializada de [`Entity`] (fixtures e intercâmbio).
///
/// `conf` e `prob` são gravados como strings numéricas; na leitura aceita-se
/// string ou número.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityRecord {
    raw_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    normalised_name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    entity_type: Option<EntityType>,
    #[serde(default, rename = "subtype", skip_serializing_if = "Vec::is_empty")]
    sub_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset_end: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pos: Vec<BoundingBox>,
    #[serde(
        default = "default_conf",
        serialize_with = "numeric_string::serialize",
        deserialize_with = "numeric_string::deserialize"
    )]
    conf: f64,
    #[serde(
        default = "default_prob",
        serialize_with = "numeric_string::serialize",
        deserialize_with = "numeric_string::deserialize"
    )]
    prob: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sense: Option<SenseRecord>,
    #[serde(default)]
    origin: Origin,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_acronym: bool,
}

fn default_conf() -> f64 {
    DEFAULT_CONF
}

fn default_prob() -> f64 {
    DEFAULT_PROB
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SenseRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fine_sense: Option<String>,
    #[serde(
        default,
        serialize_with = "numeric_string::serialize",
        deserialize_with = "numeric_string::deserialize"
    )]
    conf: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    coarse_sense: Option<String>,
}

impl From<Entity> for EntityRecord {
    fn from(e: Entity) -> Self {
        let sense = e.sense.map(|s| {
            // O sentido grosso só aparece quando difere do fino
            let coarse_sense = match (&s.fine_sense, s.coarse_sense) {
                (Some(fine), Some(coarse)) if *fine == coarse => None,
                (_, coarse) => coarse,
            };
            SenseRecord {
                fine_sense: s.fine_sense,
                conf: s.conf,
                coarse_sense,
            }
        });
        EntityRecord {
            raw_name: e.raw_name,
            normalised_name: e.normalised_name,
            entity_type: Some(e.entity_type),
            sub_types: e.sub_types,
            offset_start: Some(e.offsets.start),
            offset_end: Some(e.offsets.end),
            pos: e.bounding_boxes,
            conf: e.conf,
            prob: e.prob,
            sense,
            origin: e.origin,
            is_acronym: e.is_acronym,
        }
    }
}

impl TryFrom<EntityRecord> for Entity {
    type Error = Error;

    fn try_from(r: EntityRecord) -> Result<Self> {
        let (start, end) = match (r.offset_start, r.offset_end) {
            (Some(start), Some(end)) => (start, end),
            _ => return Err(Error::MissingOffsets(r.raw_name)),
        };
        let mut builder = Entity::builder()
            .raw_name(r.raw_name)
            .entity_type(r.entity_type.unwrap_or(EntityType::Unknown))
            .offsets(start, end)
            .conf(r.conf)
            .prob(r.prob)
            .origin(r.origin)
            .acronym(r.is_acronym);
        if let Some(name) = r.normalised_name {
            builder = builder.normalised_name(name);
        }
        for sub_type in r.sub_types {
            builder = builder.sub_type(sub_type);
        }
        for bbox in r.pos {
            builder = builder.bounding_box(bbox);
        }
        if let Some(s) = r.sense {
            builder = builder.sense(Sense {
                coarse_sense: s.coarse_sense.or_else(|| s.fine_sense.clone()),
                fine_sense: s.fine_sense,
                conf: s.conf,
                description: None,
                offsets: None,
            });
        }
        builder.build()
    }
}

mod numeric_string {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }
}
