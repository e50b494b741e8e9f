//! # Reconciliação de Entidades
//!
//! Mescla duas camadas de anotação sobre o mesmo parágrafo em uma única
//! marcação ENAMEX aninhada:
//!
//! | Camada | Origem | Tag emitida |
//! |---|---|---|
//! | Anotação do corpus | [`Origin::User`] | `<ENAMEX type="T">` |
//! | Saída do parser | [`Origin::System`] | `<ENAMEX subType="2" type="T">` |
//!
//! Regras da varredura:
//! - em cada posição, fecha primeiro (a mais interna primeiro) e depois abre
//!   (a mais larga primeiro);
//! - uma entidade do sistema com o mesmo span de uma entidade do usuário é
//!   suprimida;
//! - um span que começa dentro de outro aberto e termina depois dele é
//!   descartado com aviso (o descoberto depois perde);
//! - spans que passam do fim da sentença são descartados com aviso.

use std::path::Path;

use tracing::{debug, warn};

use crate::document::{Paragraph, TrainingDocument};
use crate::entity::{Entity, Origin};
use crate::error::Result;
use crate::pipeline::NerParser;

pub const CORPUS_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<corpus>\n\t<subcorpus>\n";
pub const CORPUS_FOOTER: &str = "\t</subcorpus>\n</corpus>\n";

/// Escapa `&`, `<`, `>` e `"` para texto e atributos XML.
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        push_escaped(&mut out, c);
    }
    out
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        _ => out.push(c),
    }
}

fn push_attr(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_xml(value));
        out.push('"');
    }
}

/// Entidade com a camada de onde veio.
#[derive(Debug, Clone, Copy)]
struct Layered<'a> {
    entity: &'a Entity,
    origin: Origin,
}

impl Layered<'_> {
    fn start(&self) -> usize {
        self.entity.offset_start()
    }

    fn end(&self) -> usize {
        self.entity.offset_end()
    }
}

#[derive(Debug, Clone)]
pub struct EntityReconciler {
    /// Marca as entidades do sistema com `subType="2"`.
    pub mark_system_layer: bool,
}

impl Default for EntityReconciler {
    fn default() -> Self {
        Self {
            mark_system_layer: true,
        }
    }
}

impl EntityReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gera o `<p>` do parágrafo com as duas camadas mescladas.
    ///
    /// As entidades do parágrafo são a camada do usuário (offsets locais às
    /// sentenças); `system_entities` já estão em coordenadas do parágrafo.
    pub fn reconcile_paragraph(&self, paragraph: &Paragraph, system_entities: &[Entity]) -> String {
        let text = paragraph.text();
        let user_entities = paragraph.entities();
        let layered = merge_layers(&text, &user_entities, system_entities);

        let mut out = String::from("\t\t\t<p");
        push_attr(&mut out, "xml:lang", paragraph.language.as_deref());
        push_attr(&mut out, "xml:id", paragraph.id.as_deref());
        out.push_str(">\n");

        for (sentence, start) in paragraph.sentences.iter().zip(paragraph.sentence_starts()) {
            out.push_str("\t\t\t\t<sentence");
            push_attr(&mut out, "xml:id", sentence.id.as_deref());
            out.push('>');
            self.mark_sentence(&mut out, sentence.raw_value(), start, &layered);
            out.push_str("</sentence>\n");
        }

        out.push_str("\t\t\t</p>\n");
        out
    }

    fn mark_sentence(&self, out: &mut String, sentence: &str, start: usize, layered: &[Layered<'_>]) {
        let end = start + sentence.len();
        let mut pending = layered
            .iter()
            .filter(|l| (start..end).contains(&l.start()))
            .filter(|l| {
                let fits = l.end() <= end;
                if !fits {
                    warn!(
                        entidade = l.entity.raw_name(),
                        inicio = l.start(),
                        fim = l.end(),
                        fim_sentenca = end,
                        "entidade ultrapassa o fim da sentença, descartada"
                    );
                }
                fits
            })
            .peekable();
        let mut open: Vec<&Layered<'_>> = Vec::new();

        let positions = sentence
            .char_indices()
            .map(|(i, c)| (start + i, Some(c)))
            .chain(std::iter::once((end, None)));

        for (pos, c) in positions {
            while open.last().is_some_and(|l| l.end() == pos) {
                open.pop();
                out.push_str("</ENAMEX>");
            }

            while let Some(candidate) = pending.next_if(|l| l.start() == pos) {
                if let Some(outer) = open.last() {
                    if outer.end() < candidate.end() {
                        warn!(
                            entidade = candidate.entity.raw_name(),
                            inicio = candidate.start(),
                            fim = candidate.end(),
                            aberta = outer.entity.raw_name(),
                            "spans cruzados, entidade descartada"
                        );
                        continue;
                    }
                }
                self.push_open_tag(out, candidate);
                open.push(candidate);
            }

            if let Some(c) = c {
                push_escaped(out, c);
            }
        }

        for _ in open.drain(..) {
            out.push_str("</ENAMEX>");
        }
    }

    fn push_open_tag(&self, out: &mut String, layered: &Layered<'_>) {
        out.push_str("<ENAMEX");
        if self.mark_system_layer && layered.origin == Origin::System {
            out.push_str(" subType=\"2\"");
        }
        out.push_str(" type=\"");
        out.push_str(layered.entity.entity_type().name());
        out.push_str("\">");
    }
}

/// Junta as duas camadas em ordem de abertura: início crescente, fim
/// decrescente, usuário antes do sistema.
///
/// Descarta spans vazios ou fora das fronteiras de caractere do texto e
/// suprime entidades do sistema duplicadas por uma do usuário.
fn merge_layers<'a>(text: &str, user: &'a [Entity], system: &'a [Entity]) -> Vec<Layered<'a>> {
    let user_layer = user.iter().map(|entity| Layered {
        entity,
        origin: Origin::User,
    });
    let system_layer = system
        .iter()
        .filter(|entity| {
            let duplicated = user.iter().any(|u| u.same_span(entity));
            if duplicated {
                debug!(entidade = entity.raw_name(), "entidade do sistema suprimida pela do usuário");
            }
            !duplicated
        })
        .map(|entity| Layered {
            entity,
            origin: Origin::System,
        });

    let mut layered: Vec<Layered<'a>> = user_layer
        .chain(system_layer)
        .filter(|l| {
            let valid = l.start() < l.end() && text.is_char_boundary(l.start()) && text.is_char_boundary(l.end());
            if !valid {
                warn!(
                    entidade = l.entity.raw_name(),
                    inicio = l.start(),
                    fim = l.end(),
                    "span vazio ou fora do texto, entidade descartada"
                );
                return false;
            }
            if !l.entity.matches_text(text) {
                warn!(
                    entidade = l.entity.raw_name(),
                    inicio = l.start(),
                    fim = l.end(),
                    trecho = text.get(l.start()..l.end()).unwrap_or_default(),
                    "rawName não corresponde ao texto nos offsets"
                );
            }
            true
        })
        .collect();

    layered.sort_by(|a, b| {
        a.start()
            .cmp(&b.start())
            .then(b.end().cmp(&a.end()))
            .then((a.origin == Origin::System).cmp(&(b.origin == Origin::System)))
    });
    layered
}

/// Nome do arquivo de saída em duas camadas: `doc.training.xml` vira
/// `doc.training.2layers.xml`.
pub fn two_layer_file_name(name: &str) -> String {
    Path::new(name)
        .with_extension("2layers.xml")
        .to_string_lossy()
        .into_owned()
}

/// Roda um parser sobre cada parágrafo do corpus anotado e mescla o
/// resultado como segunda camada.
pub struct TwoLayerCombinator<'p> {
    parser: &'p dyn NerParser,
    reconciler: EntityReconciler,
}

impl<'p> TwoLayerCombinator<'p> {
    pub fn new(parser: &'p dyn NerParser) -> Self {
        Self {
            parser,
            reconciler: EntityReconciler::default(),
        }
    }

    pub fn with_reconciler(mut self, reconciler: EntityReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Corpus XML completo (cabeçalho, documentos, rodapé).
    pub fn construct_xml(&self, documents: &[TrainingDocument]) -> Result<String> {
        let mut out = String::from(CORPUS_HEADER);

        for document in documents {
            out.push_str("\t\t<document");
            push_attr(&mut out, "name", Some(&two_layer_file_name(&document.name)));
            out.push_str(">\n");

            for paragraph in &document.paragraphs {
                let text = paragraph.text();
                let system_entities = self.parser.extract(&text)?;
                debug!(
                    documento = %document.name,
                    paragrafo = paragraph.id.as_deref().unwrap_or_default(),
                    sistema = system_entities.len(),
                    "parágrafo processado"
                );
                out.push_str(&self.reconciler.reconcile_paragraph(paragraph, &system_entities));
            }

            out.push_str("\t\t</document>\n");
        }

        out.push_str(CORPUS_FOOTER);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Sentence;
    use crate::entity::EntityType;
    use crate::metrics::MetricsSink;

    const POTUS: &str = "The President of the United States was here in New York.";

    fn entity(raw: &str, entity_type: EntityType, start: usize, end: usize) -> Entity {
        Entity::builder()
            .raw_name(raw)
            .entity_type(entity_type)
            .offsets(start, end)
            .build()
            .unwrap()
    }

    fn potus_paragraph() -> Paragraph {
        let sentence = Sentence::new(POTUS).with_entities(vec![
            entity("The President of the United States", EntityType::PersonType, 0, 34),
            entity("New York", EntityType::Location, 47, 55),
        ]);
        let mut paragraph = Paragraph::new();
        paragraph.id = Some("1".into());
        paragraph.add_sentence(sentence);
        paragraph
    }

    fn potus_system() -> Vec<Entity> {
        vec![
            entity("President of the United States", EntityType::Person, 4, 34),
            entity("President", EntityType::Title, 4, 13),
            entity("United States", EntityType::Location, 21, 34),
        ]
    }

    struct FixtureParser(Vec<Entity>);

    impl NerParser for FixtureParser {
        fn language(&self) -> &str {
            "en"
        }

        fn extract_with_metrics(&self, _text: &str, _metrics: &mut dyn MetricsSink) -> Result<Vec<Entity>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a < b && \"c\" > d"), "a &lt; b &amp;&amp; &quot;c&quot; &gt; d");
        assert_eq!(escape_xml("Zürich"), "Zürich");
    }

    #[test]
    fn test_nested_layers() {
        let xml = EntityReconciler::new().reconcile_paragraph(&potus_paragraph(), &potus_system());
        let expected = concat!(
            "\t\t\t<p xml:id=\"1\">\n",
            "\t\t\t\t<sentence>",
            "<ENAMEX type=\"PERSON_TYPE\">The ",
            "<ENAMEX subType=\"2\" type=\"PERSON\">",
            "<ENAMEX subType=\"2\" type=\"TITLE\">President</ENAMEX>",
            " of the <ENAMEX subType=\"2\" type=\"LOCATION\">United States</ENAMEX>",
            "</ENAMEX></ENAMEX>",
            " was here in <ENAMEX type=\"LOCATION\">New York</ENAMEX>.",
            "</sentence>\n",
            "\t\t\t</p>\n",
        );
        assert_eq!(xml, expected);
    }

    #[test]
    fn test_identical_span_suppressed() {
        let system = vec![entity("New York", EntityType::Location, 47, 55)];
        let xml = EntityReconciler::new().reconcile_paragraph(&potus_paragraph(), &system);
        assert_eq!(xml.matches("New York").count(), 1);
        assert!(xml.contains("<ENAMEX type=\"LOCATION\">New York</ENAMEX>"));
        assert!(!xml.contains("subType"));
    }

    #[test]
    fn test_crossing_span_dropped() {
        // "States was" começa dentro de "United States" e termina depois.
        let system = vec![
            entity("United States", EntityType::Location, 21, 34),
            entity("States was", EntityType::Event, 28, 38),
        ];
        let mut paragraph = Paragraph::new();
        paragraph.add_sentence(Sentence::new(POTUS));
        let xml = EntityReconciler::new().reconcile_paragraph(&paragraph, &system);
        assert!(xml.contains("<ENAMEX subType=\"2\" type=\"LOCATION\">United States</ENAMEX> was"));
        assert!(!xml.contains("EVENT"));
        assert_eq!(xml.matches("<ENAMEX").count(), xml.matches("</ENAMEX>").count());
    }

    #[test]
    fn test_sentence_boundaries() {
        let mut paragraph = Paragraph::new();
        paragraph.language = Some("en".into());
        paragraph.add_sentence(Sentence::new("Austria fought. ").with_id("s1"));
        paragraph.add_sentence(Sentence::new("Germany won.").with_id("s2"));
        let system = vec![
            entity("Austria", EntityType::Location, 0, 7),
            entity("fought. Germany", EntityType::Event, 8, 23),
            entity("Germany", EntityType::Location, 16, 23),
        ];
        let xml = EntityReconciler::new().reconcile_paragraph(&paragraph, &system);
        assert!(xml.starts_with("\t\t\t<p xml:lang=\"en\">\n"));
        assert!(xml.contains(
            "<sentence xml:id=\"s1\"><ENAMEX subType=\"2\" type=\"LOCATION\">Austria</ENAMEX> fought. </sentence>"
        ));
        assert!(xml.contains(
            "<sentence xml:id=\"s2\"><ENAMEX subType=\"2\" type=\"LOCATION\">Germany</ENAMEX> won.</sentence>"
        ));
        assert!(!xml.contains("EVENT"));
    }

    #[test]
    fn test_text_is_escaped() {
        let mut paragraph = Paragraph::new();
        paragraph.add_sentence(Sentence::new("AT&T <rocks>"));
        let system = vec![entity("AT&T", EntityType::Business, 0, 4)];
        let reconciler = EntityReconciler {
            mark_system_layer: false,
        };
        let xml = reconciler.reconcile_paragraph(&paragraph, &system);
        assert!(xml.contains("<sentence><ENAMEX type=\"BUSINESS\">AT&amp;T</ENAMEX> &lt;rocks&gt;</sentence>"));
    }

    #[test]
    fn test_non_boundary_span_dropped() {
        let mut paragraph = Paragraph::new();
        paragraph.add_sentence(Sentence::new("Zürich"));
        let system = vec![entity("Z", EntityType::Location, 0, 2)];
        let xml = EntityReconciler::new().reconcile_paragraph(&paragraph, &system);
        assert!(xml.contains("<sentence>Zürich</sentence>"));
    }

    #[test]
    fn test_two_layer_file_name() {
        assert_eq!(two_layer_file_name("document1"), "document1.2layers.xml");
        assert_eq!(two_layer_file_name("doc.training.xml"), "doc.training.2layers.xml");
    }

    #[test]
    fn test_construct_xml() {
        let mut document = TrainingDocument::new("document1");
        document.add_paragraph(potus_paragraph());
        let parser = FixtureParser(potus_system());

        let xml = TwoLayerCombinator::new(&parser).construct_xml(&[document]).unwrap();
        assert!(xml.starts_with(CORPUS_HEADER));
        assert!(xml.ends_with(CORPUS_FOOTER));
        assert!(xml.contains("\t\t<document name=\"document1.2layers.xml\">\n"));
        assert!(xml.contains("<ENAMEX subType=\"2\" type=\"TITLE\">President</ENAMEX>"));
        assert_eq!(xml.matches("<ENAMEX").count(), 5);
        assert_eq!(xml.matches("</ENAMEX>").count(), 5);
    }
}
