//! # Alinhamento de Offsets
//!
//! O tagger enxerga apenas tokens sem espaço; o texto original tem espaços,
//! quebras e às vezes uma tokenização diferente. O [`OffsetAligner`] percorre
//! os dois fluxos em paralelo e recupera, para cada token rotulado, a região
//! de bytes do texto original que ele consumiu.
//!
//! ```text
//! brutos:    "Austria" " " "Hungary"
//! rotulados: "Austria"     "Hungary"
//! offset:     0             7
//! added:      7             8   (espaço + "Hungary")
//! ```

use tracing::warn;

use crate::tagger::LabeledToken;

/// Token rotulado posicionado no texto original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedToken {
    pub text: String,
    pub label: Option<String>,
    /// Início da região consumida (inclui espaços que precedem o token).
    pub offset: usize,
    /// Comprimento em bytes da região consumida.
    pub added_offset: usize,
}

impl AlignedToken {
    /// Fim exclusivo da região consumida.
    pub fn end(&self) -> usize {
        self.offset + self.added_offset
    }

    /// Início do próprio token, sem o espaço que o precede.
    pub fn token_start(&self) -> usize {
        self.end().saturating_sub(self.text.len()).max(self.offset)
    }
}

/// Alinha tokens rotulados aos tokens brutos.
#[derive(Debug, Default, Clone, Copy)]
pub struct OffsetAligner;

impl OffsetAligner {
    /// Para cada token rotulado, avança sobre os tokens brutos somando seus
    /// comprimentos até achar um textualmente igual (o primeiro vence).
    ///
    /// Tokens brutos já consumidos nunca são revisitados. Se o fluxo bruto
    /// acabar sem casamento, um aviso é registrado e o token fica com o
    /// comprimento consumido.
    pub fn align<S: AsRef<str>>(raw_tokens: &[S], labeled: &[LabeledToken]) -> Vec<AlignedToken> {
        let mut aligned = Vec::with_capacity(labeled.len());
        let mut raw_pos = 0;
        let mut offset = 0;

        for token in labeled {
            let mut added_offset = 0;
            let mut found = false;
            while raw_pos < raw_tokens.len() {
                let original = raw_tokens[raw_pos].as_ref();
                raw_pos += 1;
                added_offset += original.len();
                if original == token.token {
                    found = true;
                    break;
                }
            }
            if !found {
                warn!(
                    token = %token.token,
                    offset,
                    "token rotulado sem correspondência nos tokens brutos"
                );
            }

            aligned.push(AlignedToken {
                text: token.token.clone(),
                label: token.label.clone(),
                offset,
                added_offset,
            });
            offset += added_offset;
        }

        aligned
    }
}
