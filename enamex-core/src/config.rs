//! # Configuração
//!
//! Parâmetros do pipeline, carregáveis de JSON:
//!
//! ```json
//! {
//!   "default_conf": 0.8,
//!   "default_prob": 1.0,
//!   "skip_leading_space": true,
//!   "decode_strategy": "token_by_token",
//!   "language": "en",
//!   "replace_newlines": true
//! }
//! ```
//!
//! Campos ausentes assumem o valor padrão.

use serde::{Deserialize, Serialize};

use crate::entity::{DEFAULT_CONF, DEFAULT_PROB};
use crate::error::{Error, Result};

/// Estratégia de conversão de rótulos em entidades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStrategy {
    /// Máquina de estados token a token, com fusão por contiguidade.
    #[default]
    TokenByToken,
    /// Agrupamento de tokens contíguos do mesmo tipo.
    Clustered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct NerConfig {
    /// Confiança atribuída às entidades do sistema.
    pub default_conf: f64,
    /// Probabilidade atribuída às entidades do sistema.
    pub default_prob: f64,
    /// Pula o espaço que precede o primeiro token de uma entidade.
    pub skip_leading_space: bool,
    pub decode_strategy: DecodeStrategy,
    /// Código ISO do idioma (ex: "en", "fr").
    pub language: String,
    /// Troca `\n` por espaço antes da tokenização.
    pub replace_newlines: bool,
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            default_conf: DEFAULT_CONF,
            default_prob: DEFAULT_PROB,
            skip_leading_space: true,
            decode_strategy: DecodeStrategy::TokenByToken,
            language: "en".to_string(),
            replace_newlines: true,
        }
    }
}

impl NerConfig {
    /// Carrega e valida uma configuração em JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: NerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_conf) {
            return Err(Error::config(format!(
                "default_conf fora de [0, 1]: {}",
                self.default_conf
            )));
        }
        if !(0.0..=1.0).contains(&self.default_prob) {
            return Err(Error::config(format!(
                "default_prob fora de [0, 1]: {}",
                self.default_prob
            )));
        }
        if self.language.trim().is_empty() {
            return Err(Error::config("idioma vazio"));
        }
        Ok(())
    }
}
