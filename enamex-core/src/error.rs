//! # Tipos de Erro
//!
//! Apenas falhas de **construção** viram erro: tipo de entidade desconhecido,
//! offsets invertidos, idioma sem parser, tagger externo que falhou.
//! Problemas de alinhamento, linhas malformadas do tagger e spans cruzados
//! são registrados com `tracing::warn!` e o processamento continua.

use thiserror::Error;

/// Resultado padrão das operações do crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// O rótulo não corresponde a nenhum tipo do conjunto fechado.
    #[error("tipo de entidade desconhecido: {0}")]
    UnknownEntityType(String),

    /// `start > end` em uma posição de offset.
    #[error("offsets inválidos: início {start} > fim {end}")]
    InvalidOffsets { start: usize, end: usize },

    /// O builder foi finalizado sem tipo resolvido.
    #[error("entidade sem tipo")]
    MissingEntityType,

    /// Entidade serializada sem `offsetStart`/`offsetEnd`.
    #[error("entidade sem offsets: {0}")]
    MissingOffsets(String),

    /// `prob` ou `conf` fora de `[0, 1]` (ou NaN).
    #[error("{field} fora de [0, 1]: {value}")]
    InvalidScore { field: &'static str, value: f64 },

    /// Nenhum parser registrado para o idioma.
    #[error("idioma não suportado: {0}")]
    UnsupportedLanguage(String),

    /// O tagger externo falhou.
    #[error("falha no tagger: {0}")]
    Tagger(String),

    /// Configuração inválida.
    #[error("configuração inválida: {0}")]
    Config(String),

    #[error("erro de JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expressão regular inválida: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    pub fn unknown_entity_type(label: impl Into<String>) -> Self {
        Error::UnknownEntityType(label.into())
    }

    pub fn tagger(msg: impl Into<String>) -> Self {
        Error::Tagger(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::unknown_entity_type("SPACESHIP");
        assert_eq!(err.to_string(), "tipo de entidade desconhecido: SPACESHIP");

        let err = Error::InvalidOffsets { start: 5, end: 2 };
        assert!(err.to_string().contains("5"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
