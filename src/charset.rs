//! Plate character set
//!
//! Every plate is predicted as [`MAX_PLATE_SLOTS`] independent slots, each a
//! distribution over [`VOCABULARY`]. Plates shorter than the slot count are
//! right-padded with [`PAD_CHAR`].

use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::utils::error::{PlateOcrError, Result};

/// Symbols the heads classify into, in class-index order
pub const VOCABULARY: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_";

/// Number of classes per slot
pub const VOCABULARY_SIZE: usize = 37;

/// Characters predicted per plate
pub const MAX_PLATE_SLOTS: usize = 7;

/// Padding symbol (last class)
pub const PAD_CHAR: char = '_';

/// Symbol for a class index
pub fn class_char(index: usize) -> Option<char> {
    VOCABULARY.chars().nth(index)
}

/// Class index for a symbol, case-insensitive
pub fn char_index(c: char) -> Option<usize> {
    let upper = c.to_ascii_uppercase();
    VOCABULARY.chars().position(|v| v == upper)
}

/// Turn plate text into one class index per slot, padding to the slot count
pub fn encode_plate(text: &str) -> Result<Vec<usize>> {
    let count = text.chars().count();
    if count > MAX_PLATE_SLOTS {
        return Err(PlateOcrError::InvalidInput(format!(
            "plate '{}' has {} characters, at most {} fit",
            text, count, MAX_PLATE_SLOTS
        )));
    }

    let mut indices = text
        .chars()
        .map(|c| {
            char_index(c).ok_or_else(|| {
                PlateOcrError::InvalidInput(format!("'{}' is not a plate character", c))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let pad = VOCABULARY_SIZE - 1;
    indices.resize(MAX_PLATE_SLOTS, pad);
    Ok(indices)
}

/// Decoded plate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatePrediction {
    /// Plate text with trailing padding removed
    pub text: String,
    /// One symbol per slot, padding included
    pub raw: String,
    /// Winning probability of each slot
    pub confidences: Vec<f32>,
}

impl PlatePrediction {
    pub fn mean_confidence(&self) -> f32 {
        if self.confidences.is_empty() {
            return 0.0;
        }
        self.confidences.iter().sum::<f32>() / self.confidences.len() as f32
    }

    /// Confidence of the least certain slot
    pub fn min_confidence(&self) -> f32 {
        self.confidences.iter().copied().fold(f32::INFINITY, f32::min)
    }
}

/// Decode one plate from slot-major probabilities (`slot * 37 + class`)
pub fn decode_slots(probabilities: &[f32]) -> Result<PlatePrediction> {
    let expected = MAX_PLATE_SLOTS * VOCABULARY_SIZE;
    if probabilities.len() != expected {
        return Err(PlateOcrError::Decode(format!(
            "expected {} probabilities, got {}",
            expected,
            probabilities.len()
        )));
    }

    let mut raw = String::with_capacity(MAX_PLATE_SLOTS);
    let mut confidences = Vec::with_capacity(MAX_PLATE_SLOTS);

    for (slot, chunk) in probabilities.chunks_exact(VOCABULARY_SIZE).enumerate() {
        if chunk.iter().any(|p| p.is_nan()) {
            return Err(PlateOcrError::Decode(format!("slot {} contains NaN", slot)));
        }

        let (class, &confidence) = chunk
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .ok_or_else(|| PlateOcrError::Decode(format!("slot {} is empty", slot)))?;

        // class < VOCABULARY_SIZE by construction of chunks_exact
        raw.push(class_char(class).unwrap_or(PAD_CHAR));
        confidences.push(confidence);
    }

    let text = raw.trim_end_matches(PAD_CHAR).to_string();

    Ok(PlatePrediction {
        text,
        raw,
        confidences,
    })
}

/// Decode every plate of a `[batch, 7, 37]` probability tensor
pub fn decode_batch<B: Backend>(slots: Tensor<B, 3>) -> Result<Vec<PlatePrediction>> {
    let [batch, num_slots, num_classes] = slots.dims();
    if num_slots != MAX_PLATE_SLOTS || num_classes != VOCABULARY_SIZE {
        return Err(PlateOcrError::ShapeMismatch {
            expected: vec![batch, MAX_PLATE_SLOTS, VOCABULARY_SIZE],
            actual: vec![batch, num_slots, num_classes],
        });
    }

    let values = slots
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| PlateOcrError::Decode(format!("{:?}", e)))?;

    values
        .chunks_exact(MAX_PLATE_SLOTS * VOCABULARY_SIZE)
        .map(decode_slots)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use burn::tensor::TensorData;

    fn one_hot(text: &str, confidence: f32) -> Vec<f32> {
        let rest = (1.0 - confidence) / (VOCABULARY_SIZE - 1) as f32;
        let mut probs = vec![rest; MAX_PLATE_SLOTS * VOCABULARY_SIZE];
        for (slot, class) in encode_plate(text).unwrap().into_iter().enumerate() {
            probs[slot * VOCABULARY_SIZE + class] = confidence;
        }
        probs
    }

    #[test]
    fn test_vocabulary_size() {
        assert_eq!(VOCABULARY.chars().count(), VOCABULARY_SIZE);
        assert_eq!(class_char(VOCABULARY_SIZE - 1), Some(PAD_CHAR));
        assert_eq!(class_char(VOCABULARY_SIZE), None);
    }

    #[test]
    fn test_encode_pads_short_plates() {
        let encoded = encode_plate("ab12").unwrap();
        assert_eq!(encoded, vec![10, 11, 1, 2, 36, 36, 36]);
    }

    #[test]
    fn test_encode_rejects_bad_plates() {
        assert!(encode_plate("ABCDEFGH").is_err());
        assert!(encode_plate("AB-12").is_err());
    }

    #[test]
    fn test_decode_slots() {
        let prediction = decode_slots(&one_hot("AB123", 0.9)).unwrap();
        assert_eq!(prediction.text, "AB123");
        assert_eq!(prediction.raw, "AB123__");
        assert_eq!(prediction.confidences.len(), MAX_PLATE_SLOTS);
        assert!((prediction.mean_confidence() - 0.9).abs() < 1e-6);
        assert!((prediction.min_confidence() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_keeps_inner_padding() {
        let prediction = decode_slots(&one_hot("AB_12", 0.8)).unwrap();
        assert_eq!(prediction.text, "AB_12");
    }

    #[test]
    fn test_decode_wrong_length() {
        assert!(matches!(
            decode_slots(&[0.5; 10]),
            Err(PlateOcrError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_nan() {
        let mut values = one_hot("AB12", 0.9);
        // Not the argmax of its slot, still rejected
        values[2 * VOCABULARY_SIZE + 5] = f32::NAN;
        match decode_slots(&values) {
            Err(PlateOcrError::Decode(msg)) => assert!(msg.contains("slot 2")),
            other => panic!("expected decode error, got {:?}", other),
        }

        let mut values = one_hot("AB12", 0.9);
        values[0] = -f32::NAN;
        assert!(matches!(decode_slots(&values), Err(PlateOcrError::Decode(_))));
    }

    #[test]
    fn test_decode_batch() {
        let device = Default::default();
        let mut values = one_hot("XYZ9", 0.7);
        values.extend(one_hot("1234567", 0.6));
        let data = TensorData::new(values, [2, MAX_PLATE_SLOTS, VOCABULARY_SIZE]);
        let slots = Tensor::<CpuBackend, 3>::from_data(data, &device);

        let plates = decode_batch(slots).unwrap();
        assert_eq!(plates.len(), 2);
        assert_eq!(plates[0].text, "XYZ9");
        assert_eq!(plates[1].text, "1234567");
    }

    #[test]
    fn test_decode_batch_shape_mismatch() {
        let device = Default::default();
        let slots = Tensor::<CpuBackend, 3>::zeros([1, 8, VOCABULARY_SIZE], &device);
        assert!(matches!(
            decode_batch(slots),
            Err(PlateOcrError::ShapeMismatch { .. })
        ));
    }
}
