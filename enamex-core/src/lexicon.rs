//! # Léxicos e Índices de Intervalos
//!
//! Listas de frases conhecidas (locais, títulos de pessoa, organizações e
//! formas jurídicas) casadas contra os tokens de um documento. O resultado
//! são intervalos em **índices de token** (fim inclusivo), consultados depois
//! token a token durante a montagem das features.
//!
//! ## Varredura monotônica
//!
//! As consultas de uma varredura chegam em ordem não decrescente, então cada
//! índice guarda um cursor e nunca volta atrás: o custo total de uma
//! varredura é `O(consultas + intervalos)`.
//!
//! ```text
//! intervalos: [2,3]   [7,7]   [9,12]
//! consultas:   0 1 2 3 4 5 6 7 8 9 ...
//! cursor:      ^-----^ ^-----^ ^--...
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::OffsetPosition;
use crate::tokenizer::{tokenize_word_bounds, Token};

/// Índice de intervalos ordenados e disjuntos com cursor de varredura.
#[derive(Debug, Clone)]
pub struct LexiconIntervalIndex<'a> {
    intervals: &'a [OffsetPosition],
    cursor: usize,
    last_query: Option<usize>,
    probes: usize,
}

impl<'a> LexiconIntervalIndex<'a> {
    /// Índice sobre intervalos já ordenados e disjuntos.
    pub fn new(intervals: &'a [OffsetPosition]) -> Self {
        Self {
            intervals,
            cursor: 0,
            last_query: None,
            probes: 0,
        }
    }

    /// `pos` está dentro de algum intervalo (limites inclusivos)?
    ///
    /// As consultas de uma mesma varredura devem ser não decrescentes; use
    /// [`reset`](Self::reset) para começar outra.
    ///
    /// # Panics
    ///
    /// Em builds de depuração, se `pos` for menor que a consulta anterior.
    /// Em release a consulta fora de ordem apenas responde `false` para
    /// intervalos já ultrapassados pelo cursor.
    pub fn contains(&mut self, pos: usize) -> bool {
        debug_assert!(
            self.last_query.map_or(true, |last| pos >= last),
            "consulta fora de ordem: {pos} depois de {:?}",
            self.last_query
        );
        self.last_query = Some(pos);

        while let Some(interval) = self.intervals.get(self.cursor) {
            self.probes += 1;
            if pos < interval.start {
                return false;
            }
            if pos <= interval.end {
                return true;
            }
            self.cursor += 1;
        }
        false
    }

    /// Recomeça a varredura do primeiro intervalo.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.last_query = None;
        self.probes = 0;
    }

    /// Número de intervalos examinados desde o último `reset`.
    pub fn probes(&self) -> usize {
        self.probes
    }
}

/// Flags de léxico de um token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LexiconFlags {
    pub location: bool,
    pub person_title: bool,
    pub organisation: bool,
    pub org_form: bool,
}

/// Os quatro índices de um documento.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexiconPositionsIndexes {
    pub locations: Vec<OffsetPosition>,
    pub person_titles: Vec<OffsetPosition>,
    pub organisations: Vec<OffsetPosition>,
    pub org_forms: Vec<OffsetPosition>,
}

impl LexiconPositionsIndexes {
    /// Uma varredura nova, com um cursor por índice.
    pub fn scanner(&self) -> LexiconScan<'_> {
        LexiconScan {
            location: LexiconIntervalIndex::new(&self.locations),
            person_title: LexiconIntervalIndex::new(&self.person_titles),
            organisation: LexiconIntervalIndex::new(&self.organisations),
            org_form: LexiconIntervalIndex::new(&self.org_forms),
        }
    }
}

/// Varredura simultânea dos quatro índices.
#[derive(Debug, Clone)]
pub struct LexiconScan<'a> {
    location: LexiconIntervalIndex<'a>,
    person_title: LexiconIntervalIndex<'a>,
    organisation: LexiconIntervalIndex<'a>,
    org_form: LexiconIntervalIndex<'a>,
}

impl LexiconScan<'_> {
    pub fn flags_at(&mut self, pos: usize) -> LexiconFlags {
        LexiconFlags {
            location: self.location.contains(pos),
            person_title: self.person_title.contains(pos),
            organisation: self.organisation.contains(pos),
            org_form: self.org_form.contains(pos),
        }
    }

    pub fn probes(&self) -> usize {
        self.location.probes() + self.person_title.probes() + self.organisation.probes() + self.org_form.probes()
    }
}

/// Categoria de uma lista de frases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexiconKind {
    Location,
    PersonTitle,
    Organisation,
    OrgForm,
}

/// Frases indexadas pela primeira palavra.
#[derive(Debug, Clone, Default)]
struct PhraseTable {
    by_first_word: HashMap<String, Vec<Vec<String>>>,
    len: usize,
}

impl PhraseTable {
    fn insert(&mut self, phrase: &str) {
        let words: Vec<String> = tokenize_word_bounds(phrase)
            .into_iter()
            .filter(|t| !t.is_whitespace())
            .map(|t| t.text.to_lowercase())
            .collect();
        if let Some(first) = words.first() {
            self.by_first_word.entry(first.clone()).or_default().push(words);
            self.len += 1;
        }
    }

    /// Casamento guloso pelo mais longo, sem sobreposição.
    fn find(&self, words: &[&Token], lowered: &[String]) -> Vec<OffsetPosition> {
        let mut positions = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let best = self
                .by_first_word
                .get(&lowered[i])
                .into_iter()
                .flatten()
                .filter(|phrase| {
                    i + phrase.len() <= words.len()
                        && phrase.iter().zip(&lowered[i..]).all(|(p, w)| p == w)
                })
                .map(Vec::len)
                .max()
                .unwrap_or(0);

            if best > 0 {
                positions.push(OffsetPosition {
                    start: words[i].index,
                    end: words[i + best - 1].index,
                });
                i += best;
            } else {
                i += 1;
            }
        }
        positions
    }
}

/// Contexto de léxicos imutável, construído uma vez e compartilhado
/// (via `Arc`) entre parsers e threads.
#[derive(Debug, Clone)]
pub struct NerLexicon {
    locations: PhraseTable,
    person_titles: PhraseTable,
    organisations: PhraseTable,
    org_forms: PhraseTable,
    /// Descrição de cada rótulo de sentido (ex: "country/N1").
    sense_descriptions: HashMap<String, String>,
}

impl Default for NerLexicon {
    fn default() -> Self {
        Self::new()
    }
}

impl NerLexicon {
    /// Léxico com títulos de pessoa e formas jurídicas usuais; locais e
    /// organizações começam vazios.
    pub fn new() -> Self {
        let mut lexicon = Self::empty();
        for title in [
            "mr", "mrs", "ms", "miss", "dr", "prof", "professor", "sir", "lady", "lord",
            "president", "vice president", "senator", "governor", "mayor", "minister",
            "prime minister", "general", "colonel", "captain", "king", "queen", "prince",
            "princess", "pope", "saint", "st", "m", "mme", "mlle", "président", "ministre",
        ] {
            lexicon.add(LexiconKind::PersonTitle, title);
        }
        for form in [
            "inc", "ltd", "llc", "corp", "corporation", "plc", "gmbh", "ag", "sa", "s.a.",
            "sarl", "sas", "co", "company", "group", "holdings",
        ] {
            lexicon.add(LexiconKind::OrgForm, form);
        }
        lexicon
    }

    /// Léxico sem nenhuma frase (fixtures de teste).
    pub fn empty() -> Self {
        Self {
            locations: PhraseTable::default(),
            person_titles: PhraseTable::default(),
            organisations: PhraseTable::default(),
            org_forms: PhraseTable::default(),
            sense_descriptions: HashMap::new(),
        }
    }

    /// Acrescenta uma frase à lista `kind`.
    ///
    /// O casamento ignora caixa e espaços: "New  York" e "new york" são a
    /// mesma frase. Uma frase sem nenhuma palavra é ignorada.
    pub fn add(&mut self, kind: LexiconKind, phrase: &str) {
        self.table_mut(kind).insert(phrase);
    }

    pub fn with_phrases<'p>(mut self, kind: LexiconKind, phrases: impl IntoIterator<Item = &'p str>) -> Self {
        for phrase in phrases {
            self.add(kind, phrase);
        }
        self
    }

    /// Número de frases da lista `kind`.
    pub fn len(&self, kind: LexiconKind) -> usize {
        self.table(kind).len
    }

    /// Registra (ou substitui) a descrição de um rótulo de sentido.
    pub fn add_sense_description(&mut self, label: impl Into<String>, description: impl Into<String>) {
        self.sense_descriptions.insert(label.into(), description.into());
    }

    /// Carrega descrições no formato `rótulo<TAB>descrição`, uma por linha.
    ///
    /// Linhas vazias, comentários (`#`) e linhas sem exatamente duas colunas
    /// são puladas. Devolve quantas descrições foram lidas.
    pub fn load_sense_descriptions(&mut self, contents: &str) -> usize {
        let mut loaded = 0;
        for line in contents.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split('\t').collect();
            if let [label, description] = parts.as_slice() {
                self.add_sense_description(*label, *description);
                loaded += 1;
            }
        }
        debug!(descricoes = loaded, "descrições de sentido carregadas");
        loaded
    }

    /// Descrição do rótulo de sentido, se conhecida.
    pub fn sense_description(&self, label: &str) -> Option<&str> {
        self.sense_descriptions.get(label).map(String::as_str)
    }

    fn table(&self, kind: LexiconKind) -> &PhraseTable {
        match kind {
            LexiconKind::Location => &self.locations,
            LexiconKind::PersonTitle => &self.person_titles,
            LexiconKind::Organisation => &self.organisations,
            LexiconKind::OrgForm => &self.org_forms,
        }
    }

    fn table_mut(&mut self, kind: LexiconKind) -> &mut PhraseTable {
        match kind {
            LexiconKind::Location => &mut self.locations,
            LexiconKind::PersonTitle => &mut self.person_titles,
            LexiconKind::Organisation => &mut self.organisations,
            LexiconKind::OrgForm => &mut self.org_forms,
        }
    }

    /// Calcula os quatro índices de um documento.
    ///
    /// Os espaços são ignorados no casamento, mas os intervalos usam o
    /// `index` dos tokens originais (espaços inclusos).
    pub fn compute_indexes(&self, tokens: &[Token]) -> LexiconPositionsIndexes {
        let words: Vec<&Token> = tokens.iter().filter(|t| !t.is_whitespace()).collect();
        let lowered: Vec<String> = words.iter().map(|t| t.text.to_lowercase()).collect();

        let indexes = LexiconPositionsIndexes {
            locations: self.locations.find(&words, &lowered),
            person_titles: self.person_titles.find(&words, &lowered),
            organisations: self.organisations.find(&words, &lowered),
            org_forms: self.org_forms.find(&words, &lowered),
        };
        debug!(
            locais = indexes.locations.len(),
            titulos = indexes.person_titles.len(),
            organizacoes = indexes.organisations.len(),
            formas = indexes.org_forms.len(),
            "índices de léxico calculados"
        );
        indexes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(start: usize, end: usize) -> OffsetPosition {
        OffsetPosition { start, end }
    }

    #[test]
    fn test_cursor_contains() {
        let intervals = vec![pos(2, 3), pos(7, 7), pos(9, 12)];
        let mut index = LexiconIntervalIndex::new(&intervals);
        let hits: Vec<usize> = (0..14).filter(|&p| index.contains(p)).collect();
        assert_eq!(hits, vec![2, 3, 7, 9, 10, 11, 12]);
    }

    #[test]
    fn test_empty_index() {
        let mut index = LexiconIntervalIndex::new(&[]);
        assert!(!index.contains(0));
        assert_eq!(index.probes(), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "consulta fora de ordem")]
    fn test_decreasing_query_panics() {
        let intervals = vec![pos(2, 3), pos(7, 7)];
        let mut index = LexiconIntervalIndex::new(&intervals);
        assert!(index.contains(7));
        index.contains(2);
    }

    #[test]
    fn test_sense_descriptions() {
        let mut lexicon = NerLexicon::empty();
        let loaded = lexicon.load_sense_descriptions(
            "# rótulo\tdescrição\n\ncountry/N1\ta politically organized body of people\nbroken line\nnation/N1\tthe people of a country\n",
        );
        assert_eq!(loaded, 2);
        assert_eq!(
            lexicon.sense_description("country/N1"),
            Some("a politically organized body of people")
        );
        assert_eq!(lexicon.sense_description("planet/N1"), None);
    }

    #[test]
    fn test_reset_starts_new_scan() {
        let intervals = vec![pos(0, 1)];
        let mut index = LexiconIntervalIndex::new(&intervals);
        assert!(!index.contains(5));
        index.reset();
        assert!(index.contains(1));
    }

    #[test]
    fn test_compute_indexes_longest_match() {
        let lexicon = NerLexicon::empty()
            .with_phrases(LexiconKind::Location, ["New York", "New York City", "York"])
            .with_phrases(LexiconKind::PersonTitle, ["president"]);
        let tokens = tokenize_word_bounds("The President visited New York City.");
        let indexes = lexicon.compute_indexes(&tokens);
        // The,_,President,_,visited,_,New,_,York,_,City,.
        assert_eq!(indexes.person_titles, vec![pos(2, 2)]);
        assert_eq!(indexes.locations, vec![pos(6, 10)]);
        assert!(indexes.organisations.is_empty());
    }

    #[test]
    fn test_scan_flags() {
        let lexicon = NerLexicon::new().with_phrases(LexiconKind::Organisation, ["Acme"]);
        let tokens = tokenize_word_bounds("Dr Smith of Acme Inc");
        let indexes = lexicon.compute_indexes(&tokens);
        let mut scan = indexes.scanner();
        let flags: Vec<LexiconFlags> = tokens.iter().map(|t| scan.flags_at(t.index)).collect();
        assert!(flags[0].person_title);
        assert!(flags[6].organisation);
        assert!(flags[8].org_form);
        assert_eq!(flags[2], LexiconFlags::default());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn disjoint_intervals() -> impl Strategy<Value = Vec<OffsetPosition>> {
            prop::collection::vec((0usize..5, 0usize..5), 0..30).prop_map(|gaps| {
                let mut next = 0;
                gaps.into_iter()
                    .map(|(gap, len)| {
                        let start = next + gap;
                        let end = start + len;
                        next = end + 1;
                        OffsetPosition { start, end }
                    })
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn prop_cursor_agrees_with_linear_scan(
                intervals in disjoint_intervals(),
                mut queries in prop::collection::vec(0usize..200, 0..100),
            ) {
                queries.sort_unstable();
                let mut index = LexiconIntervalIndex::new(&intervals);
                for &q in &queries {
                    let expected = intervals.iter().any(|i| i.start <= q && q <= i.end);
                    prop_assert_eq!(index.contains(q), expected);
                }
            }

            #[test]
            fn prop_cursor_work_is_bounded(
                intervals in disjoint_intervals(),
                mut queries in prop::collection::vec(0usize..200, 0..100),
            ) {
                queries.sort_unstable();
                let mut index = LexiconIntervalIndex::new(&intervals);
                for &q in &queries {
                    index.contains(q);
                }
                prop_assert!(index.probes() <= queries.len() + intervals.len());
            }
        }
    }
}
