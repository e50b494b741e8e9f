//! # Expressões Temporais
//!
//! Um segundo tagger rotula os tokens de uma expressão de data com um
//! alfabeto próprio; grupos contíguos de mesmo rótulo viram datas e uma
//! máquina de estados monta os períodos.
//!
//! | Rótulo        | Significado                       |
//! |---------------|-----------------------------------|
//! | `<dateValue>` | data isolada                      |
//! | `<dateFrom>`  | início de intervalo               |
//! | `<dateTo>`    | fim de intervalo                  |
//! | `<dateList>`  | elemento de lista de datas        |
//! | `<other>`     | fora de data                      |
//!
//! O prefixo `I-` (ou `B-`) marca o primeiro token de um grupo.
//!
//! ## Exemplo
//!
//! "between February 10 and February 28 1942." com `February 10` em
//! `<dateFrom>` e `February 28 1942` em `<dateTo>` produz um único período
//! `interval` com `from = [8,19)` e `to = [24,40)`.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

use crate::align::OffsetAligner;
use crate::entity::{Entity, EntityType, OffsetPosition, Origin};
use crate::error::Result;
use crate::features::to_date_feature_vectors;
use crate::reconcile::escape_xml;
use crate::span::cluster_tokens;
use crate::tagger::{parse_tagger_output, SequenceTagger};
use crate::tokenizer::tokenize_word_bounds;

// === Rótulos ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporalLabel {
    DateValue,
    DateIntervalFrom,
    DateIntervalTo,
    DateValueList,
    DateOther,
}

impl TemporalLabel {
    /// Interpreta um rótulo; devolve também se ele inicia um novo grupo.
    ///
    /// Rótulos desconhecidos são registrados e tratados como `DateOther`.
    pub fn from_label(label: &str) -> (Self, bool) {
        let label = label.trim();
        let (bare, starts) = match label.strip_prefix("I-").or_else(|| label.strip_prefix("B-")) {
            Some(rest) => (rest, true),
            None => (label, false),
        };
        let parsed = match bare {
            "<dateValue>" => TemporalLabel::DateValue,
            "<dateFrom>" => TemporalLabel::DateIntervalFrom,
            "<dateTo>" => TemporalLabel::DateIntervalTo,
            "<dateList>" => TemporalLabel::DateValueList,
            "<other>" | "O" => TemporalLabel::DateOther,
            other => {
                warn!(rotulo = other, "rótulo temporal desconhecido, tratado como <other>");
                TemporalLabel::DateOther
            }
        };
        (parsed, starts)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TemporalLabel::DateValue => "<dateValue>",
            TemporalLabel::DateIntervalFrom => "<dateFrom>",
            TemporalLabel::DateIntervalTo => "<dateTo>",
            TemporalLabel::DateValueList => "<dateList>",
            TemporalLabel::DateOther => "<other>",
        }
    }
}

/// Grupo de tokens rotulados, com o texto e os offsets que cobre.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalCluster {
    pub label: TemporalLabel,
    pub raw_text: String,
    pub offsets: OffsetPosition,
}

impl TemporalCluster {
    pub fn new(label: TemporalLabel, raw_text: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            label,
            raw_text: raw_text.into(),
            offsets: OffsetPosition { start, end },
        }
    }
}

// === Modelo de datas ===

/// Data normalizada; componentes ausentes ficam `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsoDate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

impl IsoDate {
    /// Forma ISO 8601 parcial (`1942`, `1942-02`, `1942-02-28`).
    pub fn to_iso_string(&self) -> Option<String> {
        let year = self.year?;
        Some(match (self.month, self.day) {
            (Some(m), Some(d)) => format!("{year:04}-{m:02}-{d:02}"),
            (Some(m), None) => format!("{year:04}-{m:02}"),
            _ => format!("{year:04}"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateWrapper {
    pub raw_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offsets: Option<OffsetPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_date: Option<IsoDate>,
}

impl DateWrapper {
    pub fn new(raw_date: impl Into<String>) -> Self {
        Self {
            raw_date: raw_date.into(),
            offsets: None,
            iso_date: None,
        }
    }

    /// Data com posição `[start, end)` no texto.
    pub fn at(raw_date: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            offsets: Some(OffsetPosition { start, end }),
            ..Self::new(raw_date)
        }
    }
}

impl std::fmt::Display for DateWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw_date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Value,
    Interval,
    List,
}

impl PeriodKind {
    pub fn name(&self) -> &'static str {
        match self {
            PeriodKind::Value => "value",
            PeriodKind::Interval => "interval",
            PeriodKind::List => "list",
        }
    }
}

/// Período resolvido. Só os campos do seu tipo são preenchidos:
/// `Value` → `value`; `Interval` → `from_date` e/ou `to_date`; `List` → `list`
/// com pelo menos um elemento.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    #[serde(rename = "type")]
    kind: PeriodKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<DateWrapper>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_date: Option<DateWrapper>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_date: Option<DateWrapper>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    list: Vec<DateWrapper>,
}

impl Period {
    /// Período de data única.
    pub fn value(date: DateWrapper) -> Self {
        Self {
            kind: PeriodKind::Value,
            value: Some(date),
            from_date: None,
            to_date: None,
            list: Vec::new(),
        }
    }

    /// Intervalo; ao menos uma das pontas deve existir.
    pub fn interval(from: Option<DateWrapper>, to: Option<DateWrapper>) -> Option<Self> {
        if from.is_none() && to.is_none() {
            return None;
        }
        Some(Self {
            kind: PeriodKind::Interval,
            value: None,
            from_date: from,
            to_date: to,
            list: Vec::new(),
        })
    }

    /// Lista; vazia não é período.
    pub fn list(dates: Vec<DateWrapper>) -> Option<Self> {
        if dates.is_empty() {
            return None;
        }
        Some(Self {
            kind: PeriodKind::List,
            value: None,
            from_date: None,
            to_date: None,
            list: dates,
        })
    }

    /// Tipo do período; diz quais campos estão preenchidos.
    pub fn kind(&self) -> PeriodKind {
        self.kind
    }

    pub fn get_value(&self) -> Option<&DateWrapper> {
        self.value.as_ref()
    }

    /// Ponta inicial de um intervalo. `None` num meio-intervalo (só `to`)
    /// e nos outros tipos.
    pub fn from_date(&self) -> Option<&DateWrapper> {
        self.from_date.as_ref()
    }

    /// Ponta final de um intervalo.
    pub fn to_date(&self) -> Option<&DateWrapper> {
        self.to_date.as_ref()
    }

    pub fn dates_list(&self) -> &[DateWrapper] {
        &self.list
    }

    /// Todas as datas do período, em ordem.
    pub fn dates(&self) -> Vec<&DateWrapper> {
        match self.kind {
            PeriodKind::Value => self.value.iter().collect(),
            PeriodKind::Interval => self.from_date.iter().chain(self.to_date.iter()).collect(),
            PeriodKind::List => self.list.iter().collect(),
        }
    }

    fn dates_mut(&mut self) -> Vec<&mut DateWrapper> {
        match self.kind {
            PeriodKind::Value => self.value.iter_mut().collect(),
            PeriodKind::Interval => self.from_date.iter_mut().chain(self.to_date.iter_mut()).collect(),
            PeriodKind::List => self.list.iter_mut().collect(),
        }
    }

    /// Região coberta, do início da primeira data ao fim da última.
    pub fn span(&self) -> Option<OffsetPosition> {
        let offsets: Vec<OffsetPosition> = self.dates().iter().filter_map(|d| d.offsets).collect();
        let start = offsets.iter().map(|o| o.start).min()?;
        let end = offsets.iter().map(|o| o.end).max()?;
        Some(OffsetPosition { start, end })
    }

    fn set_from(&mut self, date: DateWrapper) {
        self.from_date = Some(date);
    }

    fn set_to(&mut self, date: DateWrapper) {
        self.to_date = Some(date);
    }

    fn push_date(&mut self, date: DateWrapper) {
        self.list.push(date);
    }

    /// Marcação isolada do período, sem o texto ao redor.
    pub fn to_xml(&self) -> String {
        let mut out = format!("<measure type=\"{}\">", self.kind.name());
        match self.kind {
            PeriodKind::Value | PeriodKind::List => {
                for date in self.dates() {
                    out.push_str(&format!("<date>{}</date>", escape_xml(&date.raw_date)));
                }
            }
            PeriodKind::Interval => {
                if let Some(from) = &self.from_date {
                    out.push_str(&format!("<date type=\"from\">{}</date>", escape_xml(&from.raw_date)));
                }
                if let Some(to) = &self.to_date {
                    out.push_str(&format!("<date type=\"to\">{}</date>", escape_xml(&to.raw_date)));
                }
            }
        }
        out.push_str("</measure>");
        out
    }

    /// Entidades `PERIOD` para a reconciliação: uma por valor ou intervalo,
    /// uma por elemento de lista.
    pub fn to_entities(&self, text: &str) -> Vec<Entity> {
        let spans: Vec<OffsetPosition> = match self.kind {
            PeriodKind::List => self.list.iter().filter_map(|d| d.offsets).collect(),
            _ => self.span().into_iter().collect(),
        };
        spans
            .into_iter()
            .filter_map(|span| {
                let raw = span.slice(text)?;
                Entity::builder()
                    .raw_name(raw)
                    .entity_type(EntityType::Period)
                    .offsets(span.start, span.end)
                    .origin(Origin::System)
                    .build()
                    .ok()
            })
            .collect()
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            PeriodKind::Value => write!(f, "{}", self.value.as_ref().map_or("", |d| d.raw_date.as_str())),
            PeriodKind::Interval => {
                if let Some(from) = &self.from_date {
                    write!(f, "From: {from} ")?;
                }
                if let Some(to) = &self.to_date {
                    write!(f, "to: {to}")?;
                }
                Ok(())
            }
            PeriodKind::List => {
                let raws: Vec<&str> = self.list.iter().map(|d| d.raw_date.as_str()).collect();
                write!(f, "[{}]", raws.join(", "))
            }
        }
    }
}

// === Máquina de estados ===

#[derive(Debug, Clone, Copy)]
enum OpenPeriod {
    Interval(usize),
    List(usize),
}

/// Monta os períodos a partir dos grupos, numa única passada.
///
/// - `<dateValue>`: período `value` fechado (fecha uma lista aberta);
/// - `<dateFrom>`: abre intervalo; completa um intervalo que só tem `to`;
///   sobrescreve um `from` já presente; fecha uma lista aberta;
/// - `<dateTo>`: simétrico;
/// - `<dateList>`: acrescenta à lista aberta ou abre outra (fecha um
///   intervalo aberto);
/// - `<other>`: nada.
///
/// Intervalos de uma ponta só são válidos. Nunca falha.
pub fn resolve_periods(clusters: &[TemporalCluster]) -> Vec<Period> {
    let mut periods: Vec<Period> = Vec::new();
    let mut current: Option<OpenPeriod> = None;

    for cluster in clusters {
        let date = DateWrapper::at(cluster.raw_text.clone(), cluster.offsets.start, cluster.offsets.end);
        match cluster.label {
            TemporalLabel::DateValue => {
                if let Some(OpenPeriod::List(_)) = current {
                    current = None;
                }
                periods.push(Period::value(date));
            }
            TemporalLabel::DateIntervalFrom => match current {
                Some(OpenPeriod::Interval(idx)) => {
                    let period = &mut periods[idx];
                    let completes = period.from_date.is_none() && period.to_date.is_some();
                    period.set_from(date);
                    if completes {
                        current = None;
                    }
                }
                _ => {
                    periods.push(Period {
                        kind: PeriodKind::Interval,
                        value: None,
                        from_date: Some(date),
                        to_date: None,
                        list: Vec::new(),
                    });
                    current = Some(OpenPeriod::Interval(periods.len() - 1));
                }
            },
            TemporalLabel::DateIntervalTo => match current {
                Some(OpenPeriod::Interval(idx)) => {
                    let period = &mut periods[idx];
                    let completes = period.to_date.is_none() && period.from_date.is_some();
                    period.set_to(date);
                    if completes {
                        current = None;
                    }
                }
                _ => {
                    periods.push(Period {
                        kind: PeriodKind::Interval,
                        value: None,
                        from_date: None,
                        to_date: Some(date),
                        list: Vec::new(),
                    });
                    current = Some(OpenPeriod::Interval(periods.len() - 1));
                }
            },
            TemporalLabel::DateValueList => match current {
                Some(OpenPeriod::List(idx)) => periods[idx].push_date(date),
                _ => {
                    periods.push(Period {
                        kind: PeriodKind::List,
                        value: None,
                        from_date: None,
                        to_date: None,
                        list: vec![date],
                    });
                    current = Some(OpenPeriod::List(periods.len() - 1));
                }
            },
            TemporalLabel::DateOther => {}
        }
    }

    periods
}

// === Léxico temporal ===

const MONTHS_CSV: &str = "\
english,January,February,March,April,May,June,July,August,September,October,November,December
french,janvier,février,mars,avril,mai,juin,juillet,août,septembre,octobre,novembre,décembre
german,Januar,Februar,März,April,Mai,Juni,Juli,August,September,Oktober,November,Dezember
spanish,enero,febrero,marzo,abril,mayo,junio,julio,agosto,septiembre,octubre,noviembre,diciembre
italian,gennaio,febbraio,marzo,aprile,maggio,giugno,luglio,agosto,settembre,ottobre,novembre,dicembre";

const DAYS_CSV: &str = "\
english,Monday,Tuesday,Wednesday,Thursday,Friday,Saturday,Sunday
french,lundi,mardi,mercredi,jeudi,vendredi,samedi,dimanche
german,Montag,Dienstag,Mittwoch,Donnerstag,Freitag,Samstag,Sonntag
spanish,lunes,martes,miércoles,jueves,viernes,sábado,domingo
italian,lunedì,martedì,mercoledì,giovedì,venerdì,sabato,domenica";

/// Nomes de meses e dias em vários idiomas.
///
/// Cada nome entra em minúsculas, sem acento (quando difere) e, para o
/// inglês, também pelas três primeiras letras.
#[derive(Debug, Clone)]
pub struct TemporalLexicon {
    months: HashMap<String, u32>,
    days: HashMap<String, u32>,
}

impl Default for TemporalLexicon {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporalLexicon {
    /// Léxico embutido: meses e dias em cinco idiomas europeus, com formas
    /// sem acento e abreviações de três letras.
    pub fn new() -> Self {
        Self::from_csv(MONTHS_CSV, DAYS_CSV)
    }

    /// Carrega de CSV: `idioma,nome1,nome2,...` por linha.
    pub fn from_csv(months_csv: &str, days_csv: &str) -> Self {
        Self {
            months: load_names(months_csv),
            days: load_names(days_csv),
        }
    }

    /// `word` é nome de mês em algum idioma (sem distinção de caixa)?
    pub fn is_month(&self, word: &str) -> bool {
        self.months.contains_key(&word.to_lowercase())
    }

    pub fn is_day(&self, word: &str) -> bool {
        self.days.contains_key(&word.to_lowercase())
    }

    /// Número do mês (1 a 12).
    pub fn month_number(&self, word: &str) -> Option<u32> {
        self.months.get(&word.to_lowercase()).copied()
    }
}

fn load_names(csv: &str) -> HashMap<String, u32> {
    let mut names = HashMap::new();
    for line in csv.lines() {
        let mut fields = line.split(',').map(str::trim);
        let Some(language) = fields.next() else {
            continue;
        };
        for (i, name) in fields.enumerate() {
            let number = i as u32 + 1;
            let lower = name.to_lowercase();
            let unaccented = strip_accents(&lower);
            if unaccented != lower {
                names.entry(unaccented).or_insert(number);
            }
            if language.eq_ignore_ascii_case("english") {
                names.entry(lower.chars().take(3).collect()).or_insert(number);
            }
            names.entry(lower).or_insert(number);
        }
    }
    names
}

/// Decomposição NFD sem os caracteres fora do ASCII.
fn strip_accents(s: &str) -> String {
    s.nfd().filter(char::is_ascii).collect()
}

// === Normalização ===

#[derive(Debug, Clone, Copy)]
enum DateLayout {
    YearMonthDay,
    DayMonthYear,
    DayMonthNameYear,
    MonthNameDayYear,
    MonthNameDay,
    MonthNameYear,
    Year,
}

/// Converte datas textuais em [`IsoDate`].
///
/// Formatos: `YYYY-MM-DD`, `DD-MM-YYYY`, `DD/MM/YYYY`, `DD Month YYYY`,
/// `Month DD YYYY`, `Month DD`, `Month YYYY` e `YYYY`. O que não casa (ou
/// tem mês/dia fora do intervalo) degrada para `None`.
#[derive(Debug, Clone)]
pub struct DateNormaliser {
    lexicon: TemporalLexicon,
    patterns: Vec<(Regex, DateLayout)>,
}

impl DateNormaliser {
    /// Compila os padrões de data. Falha apenas se um padrão não compilar
    /// (`Error::Regex`).
    pub fn new(lexicon: TemporalLexicon) -> Result<Self> {
        let patterns = vec![
            (Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$")?, DateLayout::YearMonthDay),
            (Regex::new(r"^(\d{1,2})[-/.](\d{1,2})[-/.](\d{4})$")?, DateLayout::DayMonthYear),
            (
                Regex::new(r"^(\d{1,2})(?:st|nd|rd|th|er)?\s+(\p{L}+)\.?,?\s+(\d{4})$")?,
                DateLayout::DayMonthNameYear,
            ),
            (
                Regex::new(r"^(\p{L}+)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})$")?,
                DateLayout::MonthNameDayYear,
            ),
            (Regex::new(r"^(\p{L}+)\.?\s+(\d{1,2})(?:st|nd|rd|th)?$")?, DateLayout::MonthNameDay),
            (Regex::new(r"^(\p{L}+)\.?,?\s+(\d{4})$")?, DateLayout::MonthNameYear),
            (Regex::new(r"^(\d{4})$")?, DateLayout::Year),
        ];
        Ok(Self { lexicon, patterns })
    }

    pub fn lexicon(&self) -> &TemporalLexicon {
        &self.lexicon
    }

    /// Data ISO de `raw`, testando os padrões em ordem; o primeiro que casa
    /// com mês e dia válidos vence.
    pub fn normalise(&self, raw: &str) -> Option<IsoDate> {
        let compact = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        for (regex, layout) in &self.patterns {
            let Some(caps) = regex.captures(&compact) else {
                continue;
            };
            let group = |i: usize| caps.get(i).map(|m| m.as_str());
            let number = |i: usize| group(i).and_then(|s| s.parse::<u32>().ok());
            let year = |i: usize| group(i).and_then(|s| s.parse::<i32>().ok());
            let month_name = |i: usize| group(i).and_then(|s| self.lexicon.month_number(s));

            let date = match layout {
                DateLayout::YearMonthDay => IsoDate {
                    year: year(1),
                    month: number(2),
                    day: number(3),
                },
                DateLayout::DayMonthYear => IsoDate {
                    year: year(3),
                    month: number(2),
                    day: number(1),
                },
                DateLayout::DayMonthNameYear => IsoDate {
                    year: year(3),
                    month: Some(month_name(2)?),
                    day: number(1),
                },
                DateLayout::MonthNameDayYear => IsoDate {
                    year: year(3),
                    month: Some(month_name(1)?),
                    day: number(2),
                },
                DateLayout::MonthNameDay => IsoDate {
                    year: None,
                    month: Some(month_name(1)?),
                    day: number(2),
                },
                DateLayout::MonthNameYear => IsoDate {
                    year: year(2),
                    month: Some(month_name(1)?),
                    day: None,
                },
                DateLayout::Year => IsoDate {
                    year: year(1),
                    month: None,
                    day: None,
                },
            };
            return valid(date);
        }
        None
    }
}

fn valid(date: IsoDate) -> Option<IsoDate> {
    if date.month.is_some_and(|m| !(1..=12).contains(&m)) {
        return None;
    }
    if date.day.is_some_and(|d| !(1..=31).contains(&d)) {
        return None;
    }
    Some(date)
}

/// Atalho com o léxico padrão.
pub fn normalise_date(raw: &str) -> Option<IsoDate> {
    DateNormaliser::new(TemporalLexicon::new()).ok()?.normalise(raw)
}

// === Parser temporal ===

/// Extração de períodos a partir da saída do tagger de datas.
#[derive(Debug, Clone)]
pub struct TemporalParser {
    normaliser: DateNormaliser,
}

impl TemporalParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            normaliser: DateNormaliser::new(TemporalLexicon::new())?,
        })
    }

    pub fn with_lexicon(lexicon: TemporalLexicon) -> Result<Self> {
        Ok(Self {
            normaliser: DateNormaliser::new(lexicon)?,
        })
    }

    pub fn lexicon(&self) -> &TemporalLexicon {
        self.normaliser.lexicon()
    }

    /// Agrupa os tokens rotulados e resolve os períodos.
    ///
    /// `raw_tokens` é a tokenização original (espaços inclusos) de `text`.
    pub fn extract_periods<S: AsRef<str>>(&self, tagger_output: &str, text: &str, raw_tokens: &[S]) -> Vec<Period> {
        let labeled = parse_tagger_output(tagger_output);
        let aligned = OffsetAligner::align(raw_tokens, &labeled);
        let clusters = match cluster_tokens(&aligned, |label| Ok(TemporalLabel::from_label(label))) {
            Ok(clusters) => clusters,
            Err(e) => {
                warn!(erro = %e, "falha ao agrupar rótulos temporais");
                return Vec::new();
            }
        };

        let clusters: Vec<TemporalCluster> = clusters
            .into_iter()
            .map(|c| {
                let raw_text = text.get(c.start..c.end).unwrap_or_default();
                TemporalCluster::new(c.label, raw_text, c.start, c.end)
            })
            .collect();

        let mut periods = resolve_periods(&clusters);
        for period in &mut periods {
            for date in period.dates_mut() {
                date.iso_date = self.normaliser.normalise(&date.raw_date);
            }
        }
        debug!(periodos = periods.len(), grupos = clusters.len(), "períodos resolvidos");
        periods
    }

    /// Tokeniza, monta as features, chama o tagger e extrai os períodos.
    pub fn process(&self, tagger: &dyn SequenceTagger, text: &str) -> Result<Vec<Period>> {
        let tokens = tokenize_word_bounds(text);
        let input = to_date_feature_vectors(&tokens, self.lexicon());
        if input.is_empty() {
            return Ok(Vec::new());
        }
        let output = tagger.tag(&input)?;
        Ok(self.extract_periods(&output, text, &tokens))
    }

    /// Anota cada linha (aparada) com os períodos encontrados, dentro de
    /// `<dates>`, no formato dos dados de treino.
    pub fn create_training_data(&self, tagger: &dyn SequenceTagger, input: &str) -> Result<String> {
        let mut out = String::from("<dates>");
        for line in input.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let periods = self.process(tagger, line)?;
            out.push_str(&markup_periods(line, &periods));
            out.push('\n');
        }
        out.push_str("</dates>");
        Ok(out)
    }
}

/// Marcação em linha: o texto original com cada período envolvido em
/// `<measure>` e cada data em `<date>`.
///
/// Os períodos devem vir em ordem e sem sobreposição; um período que começa
/// antes do ponto já escrito é ignorado com aviso.
pub fn markup_periods(line: &str, periods: &[Period]) -> String {
    let mut out = String::new();
    let mut pos = 0;

    for period in periods {
        let Some(span) = period.span() else {
            continue;
        };
        if span.start < pos || line.get(span.start..span.end).is_none() {
            warn!(inicio = span.start, fim = span.end, "período sobreposto ou fora da linha, ignorado");
            continue;
        }
        out.push_str(&escape_xml(&line[pos..span.start]));
        pos = span.start;
        out.push_str(&format!("<measure type=\"{}\">", period.kind().name()));

        let mut tagged: Vec<(&DateWrapper, &str)> = match period.kind() {
            PeriodKind::Interval => period
                .from_date()
                .map(|d| (d, " type=\"from\""))
                .into_iter()
                .chain(period.to_date().map(|d| (d, " type=\"to\"")))
                .collect(),
            _ => period.dates().into_iter().map(|d| (d, "")).collect(),
        };
        // "até 1945 desde 1939": as datas saem na ordem do texto
        tagged.sort_by_key(|(date, _)| date.offsets.map(|o| o.start));
        for (date, attr) in tagged {
            let Some(offsets) = date.offsets else {
                continue;
            };
            if offsets.start < pos || line.get(offsets.start..offsets.end).is_none() {
                warn!(
                    data = %date.raw_date,
                    inicio = offsets.start,
                    "data sobreposta ou fora da linha, sem marcação"
                );
                continue;
            }
            out.push_str(&escape_xml(&line[pos..offsets.start]));
            out.push_str(&format!("<date{attr}>{}</date>", escape_xml(&line[offsets.start..offsets.end])));
            pos = offsets.end;
        }
        out.push_str("</measure>");
    }

    if let Some(rest) = line.get(pos..) {
        out.push_str(&escape_xml(rest));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize_word_bounds;

    fn raw(text: &str) -> Vec<String> {
        tokenize_word_bounds(text).into_iter().map(|t| t.text).collect()
    }

    fn rows(pairs: &[(&str, &str)]) -> String {
        pairs
            .iter()
            .map(|(t, l)| format!("{t} {l}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!(TemporalLabel::from_label("I-<dateFrom>"), (TemporalLabel::DateIntervalFrom, true));
        assert_eq!(TemporalLabel::from_label("<dateTo>"), (TemporalLabel::DateIntervalTo, false));
        assert_eq!(TemporalLabel::from_label("<weird>"), (TemporalLabel::DateOther, false));
    }

    #[test]
    fn test_interval_period() {
        let text = "between February 10 and February 28 1942.";
        let output = rows(&[
            ("between", "<other>"),
            ("February", "I-<dateFrom>"),
            ("10", "<dateFrom>"),
            ("and", "<other>"),
            ("February", "I-<dateTo>"),
            ("28", "<dateTo>"),
            ("1942", "<dateTo>"),
            (".", "<other>"),
        ]);
        let parser = TemporalParser::new().unwrap();
        let periods = parser.extract_periods(&output, text, &raw(text));
        assert_eq!(periods.len(), 1);
        let period = &periods[0];
        assert_eq!(period.kind(), PeriodKind::Interval);

        let from = period.from_date().unwrap();
        assert_eq!(from.raw_date, "February 10");
        assert_eq!(from.offsets, Some(OffsetPosition { start: 8, end: 19 }));

        let to = period.to_date().unwrap();
        assert_eq!(to.raw_date, "February 28 1942");
        assert_eq!(to.offsets, Some(OffsetPosition { start: 24, end: 40 }));
        assert_eq!(to.iso_date.and_then(|d| d.to_iso_string()).as_deref(), Some("1942-02-28"));
    }

    #[test]
    fn test_half_interval() {
        let text = "- 1941";
        let output = rows(&[("-", "<other>"), ("1941", "I-<dateTo>")]);
        let periods = TemporalParser::new().unwrap().extract_periods(&output, text, &raw(text));
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].kind(), PeriodKind::Interval);
        assert!(periods[0].from_date().is_none());
        assert_eq!(periods[0].to_date().unwrap().raw_date, "1941");
    }

    #[test]
    fn test_single_value() {
        let text = "in February 28 1942.";
        let output = rows(&[
            ("in", "<other>"),
            ("February", "I-<dateValue>"),
            ("28", "<dateValue>"),
            ("1942", "<dateValue>"),
            (".", "<other>"),
        ]);
        let periods = TemporalParser::new().unwrap().extract_periods(&output, text, &raw(text));
        assert_eq!(periods.len(), 1);
        let value = periods[0].get_value().unwrap();
        assert_eq!(value.offsets, Some(OffsetPosition { start: 3, end: 19 }));
    }

    #[test]
    fn test_list_period() {
        let text = "1942-07-27, 19-12-1932, 12 February 1983, 18 January 2220";
        let output = rows(&[
            ("1942", "I-<dateList>"),
            ("-", "<dateList>"),
            ("07", "<dateList>"),
            ("-", "<dateList>"),
            ("27", "<dateList>"),
            (",", "<other>"),
            ("19", "<dateList>"),
            ("-", "<dateList>"),
            ("12", "<dateList>"),
            ("-", "<dateList>"),
            ("1932", "<dateList>"),
            (",", "<other>"),
            ("12", "<dateList>"),
            ("February", "<dateList>"),
            ("1983", "<dateList>"),
            (",", "<other>"),
            ("18", "<dateList>"),
            ("January", "<dateList>"),
            ("2220", "<dateList>"),
        ]);
        let periods = TemporalParser::new().unwrap().extract_periods(&output, text, &raw(text));
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].kind(), PeriodKind::List);
        let dates = periods[0].dates_list();
        assert_eq!(dates.len(), 4);
        for date in dates {
            let offsets = date.offsets.unwrap();
            assert_eq!(&text[offsets.start..offsets.end], date.raw_date);
        }
        assert_eq!(dates[1].raw_date, "19-12-1932");
        assert_eq!(dates[2].iso_date.unwrap().month, Some(2));
    }

    fn cluster(label: TemporalLabel, start: usize) -> TemporalCluster {
        TemporalCluster::new(label, "x", start, start + 1)
    }

    #[test]
    fn test_from_overwrites_open_from() {
        let periods = resolve_periods(&[
            cluster(TemporalLabel::DateIntervalFrom, 0),
            cluster(TemporalLabel::DateIntervalFrom, 5),
            cluster(TemporalLabel::DateIntervalTo, 9),
        ]);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].from_date().unwrap().offsets.unwrap().start, 5);
        assert_eq!(periods[0].to_date().unwrap().offsets.unwrap().start, 9);
    }

    #[test]
    fn test_to_then_from_closes() {
        let periods = resolve_periods(&[
            cluster(TemporalLabel::DateIntervalTo, 0),
            cluster(TemporalLabel::DateIntervalFrom, 3),
            cluster(TemporalLabel::DateIntervalFrom, 6),
        ]);
        assert_eq!(periods.len(), 2);
        assert!(periods[0].from_date().is_some() && periods[0].to_date().is_some());
        assert!(periods[1].to_date().is_none());
    }

    #[test]
    fn test_value_never_merges_and_closes_list() {
        let periods = resolve_periods(&[
            cluster(TemporalLabel::DateValueList, 0),
            cluster(TemporalLabel::DateOther, 2),
            cluster(TemporalLabel::DateValueList, 4),
            cluster(TemporalLabel::DateValue, 6),
            cluster(TemporalLabel::DateValue, 8),
            cluster(TemporalLabel::DateValueList, 10),
        ]);
        let kinds: Vec<PeriodKind> = periods.iter().map(Period::kind).collect();
        assert_eq!(
            kinds,
            vec![PeriodKind::List, PeriodKind::Value, PeriodKind::Value, PeriodKind::List]
        );
        assert_eq!(periods[0].dates_list().len(), 2);
    }

    #[test]
    fn test_list_closes_interval() {
        let periods = resolve_periods(&[
            cluster(TemporalLabel::DateIntervalFrom, 0),
            cluster(TemporalLabel::DateValueList, 3),
            cluster(TemporalLabel::DateIntervalTo, 6),
        ]);
        assert_eq!(periods.len(), 3);
        assert!(periods[2].from_date().is_none());
    }

    #[test]
    fn test_constructors_enforce_fields() {
        assert!(Period::interval(None, None).is_none());
        assert!(Period::list(Vec::new()).is_none());
        let p = Period::value(DateWrapper::new("1942"));
        assert!(p.from_date().is_none() && p.dates_list().is_empty());
    }

    #[test]
    fn test_lexicon_variants() {
        let lexicon = TemporalLexicon::new();
        assert!(lexicon.is_month("February"));
        assert!(lexicon.is_month("feb"));
        assert!(lexicon.is_month("fevrier"));
        assert!(lexicon.is_month("Février"));
        assert!(lexicon.is_day("mercredi"));
        assert!(!lexicon.is_month("tuesday"));
        assert_eq!(lexicon.month_number("décembre"), Some(12));
    }

    #[test]
    fn test_normalise_date() {
        let iso = |raw: &str| normalise_date(raw).and_then(|d| d.to_iso_string());
        assert_eq!(iso("1942-07-27").as_deref(), Some("1942-07-27"));
        assert_eq!(iso("19-12-1932").as_deref(), Some("1932-12-19"));
        assert_eq!(iso("12 February 1983").as_deref(), Some("1983-02-12"));
        assert_eq!(iso("February 28, 1942").as_deref(), Some("1942-02-28"));
        assert_eq!(iso("mars 1871").as_deref(), Some("1871-03"));
        assert_eq!(iso("1941").as_deref(), Some("1941"));
        assert_eq!(normalise_date("February 10").unwrap().day, Some(10));
        assert!(normalise_date("31-13-1999").is_none());
        assert!(normalise_date("next week").is_none());
    }

    #[test]
    fn test_period_xml() {
        let period = Period::interval(Some(DateWrapper::new("1939")), Some(DateWrapper::new("1945"))).unwrap();
        assert_eq!(
            period.to_xml(),
            "<measure type=\"interval\"><date type=\"from\">1939</date><date type=\"to\">1945</date></measure>"
        );
    }

    #[test]
    fn test_markup_periods_inline() {
        let line = "between February 10 and February 28 1942.";
        let period = Period::interval(
            Some(DateWrapper::at("February 10", 8, 19)),
            Some(DateWrapper::at("February 28 1942", 24, 40)),
        )
        .unwrap();
        assert_eq!(
            markup_periods(line, &[period]),
            "between <measure type=\"interval\"><date type=\"from\">February 10</date> and \
             <date type=\"to\">February 28 1942</date></measure>."
        );
    }

    #[test]
    fn test_markup_to_date_before_from_date() {
        let tagger = |input: &str| -> Result<String> {
            Ok(input
                .lines()
                .map(|row| {
                    let token = row.split(' ').next().unwrap_or_default();
                    let label = match token {
                        "1945" => "I-<dateTo>",
                        "1939" => "I-<dateFrom>",
                        _ => "<other>",
                    };
                    format!("{token} {label}")
                })
                .collect::<Vec<_>>()
                .join("\n"))
        };
        let parser = TemporalParser::new().unwrap();
        let periods = parser.process(&tagger, "until 1945 from 1939").unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].to_date().unwrap().offsets, Some(OffsetPosition { start: 6, end: 10 }));

        let training = parser.create_training_data(&tagger, "until 1945 from 1939").unwrap();
        assert_eq!(
            training,
            "<dates>until <measure type=\"interval\"><date type=\"to\">1945</date> from \
             <date type=\"from\">1939</date></measure>\n</dates>"
        );
    }

    #[test]
    fn test_period_to_entities() {
        let text = "in February 28 1942.";
        let period = Period::value(DateWrapper::at("February 28 1942", 3, 19));
        let entities = period.to_entities(text);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_type(), EntityType::Period);
        assert_eq!(entities[0].raw_name(), "February 28 1942");
    }

    #[test]
    fn test_process_with_fixture_tagger() {
        // Rotula tudo que é ano como <dateValue>
        let tagger = |input: &str| -> Result<String> {
            Ok(input
                .lines()
                .map(|row| {
                    let token = row.split(' ').next().unwrap_or_default();
                    let label = if token.len() == 4 && token.chars().all(|c| c.is_ascii_digit()) {
                        "I-<dateValue>"
                    } else {
                        "<other>"
                    };
                    format!("{token} {label}")
                })
                .collect::<Vec<_>>()
                .join("\n"))
        };
        let parser = TemporalParser::new().unwrap();
        let periods = parser.process(&tagger, "born in 1867, died 1934").unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[1].get_value().unwrap().raw_date, "1934");

        let training = parser.create_training_data(&tagger, "  born in 1867\n\n").unwrap();
        assert_eq!(
            training,
            "<dates>born in <measure type=\"value\"><date>1867</date></measure>\n</dates>"
        );
    }

    #[test]
    fn test_period_json() {
        let period = Period::value(DateWrapper::at("1941", 2, 6));
        let json = serde_json::to_value(&period).unwrap();
        assert_eq!(json["type"], "value");
        assert_eq!(json["value"]["rawDate"], "1941");
        assert!(json.get("list").is_none());
    }
}
