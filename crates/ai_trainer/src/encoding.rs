use delphi_features::Label;

use crate::errors::TrainerError;

/// Fixed mapping between label text and the learner's class ids
///
/// `benign` is class 0 and `malware` is class 1. Any other text is
/// rejected instead of being assigned a new class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelEncoding;

impl LabelEncoding {
    pub const CLASSES: usize = 2;

    pub fn encode(&self, label: Label) -> u8 {
        match label {
            Label::Benign => 0,
            Label::Malware => 1,
        }
    }

    pub fn decode(&self, class: u8) -> Option<Label> {
        match class {
            0 => Some(Label::Benign),
            1 => Some(Label::Malware),
            _ => None,
        }
    }

    /// Encode label text found in dataset row `row`
    pub fn encode_text(&self, row: usize, text: &str) -> Result<u8, TrainerError> {
        text.parse::<Label>()
            .map(|label| self.encode(label))
            .map_err(|_| TrainerError::InvalidLabel {
                row,
                label: text.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_class_ids() {
        let enc = LabelEncoding;
        assert_eq!(enc.encode(Label::Benign), 0);
        assert_eq!(enc.encode(Label::Malware), 1);
        assert_eq!(enc.decode(1), Some(Label::Malware));
        assert_eq!(enc.decode(2), None);
    }

    #[test]
    fn test_unknown_text_rejected() {
        let enc = LabelEncoding;
        assert_eq!(enc.encode_text(0, "malware").unwrap(), 1);

        let err = enc.encode_text(3, "Malware").unwrap_err();
        assert!(matches!(err, TrainerError::InvalidLabel { row: 3, ref label } if label == "Malware"));
    }
}
