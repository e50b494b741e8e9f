//! # Contrato do Tagger e Esquema de Rótulos
//!
//! O tagger estatístico é externo: recebe linhas de features (um token por
//! linha, linha em branco separa sentenças) e devolve uma linha por token no
//! formato `<token> ... <rótulo>`. Este módulo define o contrato
//! [`SequenceTagger`], o parser da saída e o tipo fechado [`NerTag`].
//!
//! ## Esquema de Rótulos
//!
//! | Rótulo          | Tag                    | Significado                    |
//! |-----------------|------------------------|--------------------------------|
//! | `B-LOCATION`    | `Begin(Location)`      | primeiro token de uma entidade |
//! | `I-LOCATION`    | `Inside(Location)`     | continuação                    |
//! | `LOCATION`      | `Inside(Location)`     | continuação (forma nua)        |
//! | `O` / `other`   | `Other`                | fora de entidade               |

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entity::EntityType;
use crate::error::Result;

/// Tag de entidade aplicada a um token, interpretada uma única vez.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NerTag {
    /// Início de entidade (`B-X`).
    Begin(EntityType),
    /// Continuação (`I-X` ou `X`).
    Inside(EntityType),
    /// Fora de entidade (`O`, `other`).
    Other,
}

impl NerTag {
    /// Interpreta um rótulo do tagger.
    ///
    /// Um tipo desconhecido é erro de tipagem: `Err(Error::UnknownEntityType)`.
    pub fn from_label(label: &str) -> Result<Self> {
        let label = label.trim();
        if label.is_empty() || label == "O" || label.eq_ignore_ascii_case("other") {
            return Ok(NerTag::Other);
        }
        if let Some(rest) = label.strip_prefix("B-") {
            return Ok(NerTag::Begin(rest.parse()?));
        }
        let bare = label.strip_prefix("I-").unwrap_or(label);
        Ok(NerTag::Inside(bare.parse()?))
    }

    /// Representação canônica (ex: "B-PERSON", "PERSON", "O").
    pub fn label(&self) -> String {
        match self {
            NerTag::Begin(t) => format!("B-{}", t.name()),
            NerTag::Inside(t) => t.name().to_string(),
            NerTag::Other => "O".to_string(),
        }
    }

    /// Tipo da tag, se não for `Other`.
    pub fn entity_type(&self) -> Option<EntityType> {
        match self {
            NerTag::Begin(t) | NerTag::Inside(t) => Some(*t),
            NerTag::Other => None,
        }
    }
}

impl std::fmt::Display for NerTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Tagger de sequência externo (CRF, rede neural, fixture de teste...).
///
/// Implementações devem ser `Send + Sync`: um único tagger atende várias
/// threads no processamento em lote.
pub trait SequenceTagger: Send + Sync {
    /// Recebe as linhas de features e devolve as linhas rotuladas.
    fn tag(&self, input: &str) -> Result<String>;
}

impl<F> SequenceTagger for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn tag(&self, input: &str) -> Result<String> {
        self(input)
    }
}

/// Um token da saída do tagger com seu rótulo (última coluna).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledToken {
    pub token: String,
    /// `None` quando o tagger não emitiu coluna de rótulo.
    pub label: Option<String>,
}

impl LabeledToken {
    pub fn new(token: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            label: Some(label.into()),
        }
    }

    pub fn unlabeled(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            label: None,
        }
    }
}

/// Converte a saída textual do tagger em tokens rotulados.
///
/// - o token é a primeira coluna, o rótulo a última;
/// - linhas em branco separam blocos (sentenças) e não geram tokens;
/// - uma linha cujo número de colunas difere da primeira linha do bloco é
///   registrada como aviso e ignorada;
/// - blocos de uma coluna só produzem tokens sem rótulo.
pub fn parse_tagger_output(output: &str) -> Vec<LabeledToken> {
    let mut tokens = Vec::new();
    let mut block_columns: Option<usize> = None;

    for (line_no, line) in output.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            block_columns = None;
            continue;
        }

        let expected = *block_columns.get_or_insert(fields.len());
        if fields.len() != expected {
            warn!(
                linha = line_no + 1,
                colunas = fields.len(),
                esperado = expected,
                "linha do tagger malformada, ignorada"
            );
            continue;
        }

        let token = fields[0];
        if fields.len() == 1 {
            tokens.push(LabeledToken::unlabeled(token));
        } else {
            tokens.push(LabeledToken::new(token, fields[fields.len() - 1]));
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_tag_from_label() {
        assert_eq!(NerTag::from_label("O").unwrap(), NerTag::Other);
        assert_eq!(NerTag::from_label("other").unwrap(), NerTag::Other);
        assert_eq!(
            NerTag::from_label("B-LOCATION").unwrap(),
            NerTag::Begin(EntityType::Location)
        );
        assert_eq!(
            NerTag::from_label("I-person").unwrap(),
            NerTag::Inside(EntityType::Person)
        );
        assert_eq!(
            NerTag::from_label("PERSON_TYPE").unwrap(),
            NerTag::Inside(EntityType::PersonType)
        );
    }

    #[test]
    fn test_unknown_label_type_is_error() {
        let err = NerTag::from_label("B-SPACESHIP").unwrap_err();
        assert!(matches!(err, Error::UnknownEntityType(_)));
    }

    #[test]
    fn test_tag_labels() {
        assert_eq!(NerTag::Begin(EntityType::Person).label(), "B-PERSON");
        assert_eq!(NerTag::Inside(EntityType::Location).label(), "LOCATION");
        assert_eq!(NerTag::Other.to_string(), "O");
        assert_eq!(NerTag::Other.entity_type(), None);
    }

    #[test]
    fn test_parse_tagger_output() {
        let output = "Austria austria A Xx B-LOCATION\n\
                      fought fought f xx O\n\
                      \n\
                      Germany germany G Xx B-LOCATION\n";
        let tokens = parse_tagger_output(output);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], LabeledToken::new("Austria", "B-LOCATION"));
        assert_eq!(tokens[1].label.as_deref(), Some("O"));
        assert_eq!(tokens[2].token, "Germany");
    }

    #[test]
    fn test_malformed_row_is_skipped() {
        let output = "Austria a A B-LOCATION\nbroken O\nHungary h H B-LOCATION\n";
        let tokens = parse_tagger_output(output);
        let texts: Vec<&str> = tokens.iter().map(|t| t.token.as_str()).collect();
        assert_eq!(texts, vec!["Austria", "Hungary"]);
    }

    #[test]
    fn test_column_count_resets_per_block() {
        let output = "a x O\n\nb O\nc O\n";
        assert_eq!(parse_tagger_output(output).len(), 3);
    }

    #[test]
    fn test_single_column_has_no_label() {
        let tokens = parse_tagger_output("Austria\nHungary\n");
        assert!(tokens.iter().all(|t| t.label.is_none()));
    }

    #[test]
    fn test_closure_is_a_tagger() {
        let tagger = |input: &str| -> Result<String> {
            Ok(input
                .lines()
                .map(|l| format!("{l} O"))
                .collect::<Vec<_>>()
                .join("\n"))
        };
        assert_eq!(tagger.tag("x").unwrap(), "x O");
    }
}
