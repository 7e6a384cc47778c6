//! Predictor reversal for FlateDecode/LZWDecode payloads.
//!
//! Xref streams almost always use PNG "Up" prediction, so PNG predictors
//! (10-15) and TIFF predictor 2 are both handled here.

use crate::error::{Error, Result};
use crate::object::Object;

/// `/DecodeParms` values that affect prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Samples per row
    pub columns: usize,
    /// Color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Read predictor parameters from a `/DecodeParms` entry.
    ///
    /// Returns `None` when the entry is absent or selects no prediction.
    /// For an array of parameter dictionaries the first dictionary is used.
    pub fn from_object(params: Option<&Object>) -> Option<Self> {
        let dict = match params? {
            Object::Dictionary(d) => d,
            Object::Array(arr) => arr.iter().find_map(|obj| match obj {
                Object::Dictionary(d) => Some(d),
                _ => None,
            })?,
            _ => return None,
        };

        let int = |key: &str, default: i64| {
            dict.get(key)
                .and_then(|o| o.as_integer())
                .unwrap_or(default)
        };

        let params = Self {
            predictor: int("Predictor", 1),
            columns: int("Columns", 1).max(1) as usize,
            colors: int("Colors", 1).max(1) as usize,
            bits_per_component: int("BitsPerComponent", 8).max(1) as usize,
        };
        (params.predictor > 1).then_some(params)
    }

    /// Bytes of sample data per row (without the PNG tag byte).
    pub fn pixel_bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Undo the predictor described by `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff(data, params),
        10..=15 => decode_png(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

fn decode_tiff(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::Decode(format!(
            "TIFF predictor with {} bits per component is not supported",
            params.bits_per_component
        )));
    }
    let row_len = params.pixel_bytes_per_row();
    let bpp = params.colors;
    let mut output = data.to_vec();
    for row in output.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    Ok(output)
}

fn decode_png(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.pixel_bytes_per_row();
    let stride = row_len + 1;
    let bpp = params.bytes_per_pixel();

    if data.len() % stride != 0 {
        log::warn!(
            "PNG predictor: data length {} is not a multiple of row size {}, ignoring trailing bytes",
            data.len(),
            stride
        );
    }

    let mut output: Vec<u8> = Vec::with_capacity(data.len() / stride * row_len);
    let mut previous = vec![0u8; row_len];

    for row in data.chunks_exact(stride) {
        let tag = row[0];
        let encoded = &row[1..];
        let mut current = vec![0u8; row_len];

        for i in 0..row_len {
            let left = if i >= bpp { current[i - bpp] } else { 0 };
            let up = previous[i];
            let up_left = if i >= bpp { previous[i - bpp] } else { 0 };

            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", other)));
                },
            };
            current[i] = encoded[i].wrapping_add(predicted);
        }

        output.extend_from_slice(&current);
        previous = current;
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_png_up_predictor() {
        let params = DecodeParams {
            predictor: 12,
            columns: 5,
            ..Default::default()
        };
        let encoded = vec![2, 10, 20, 30, 40, 50, 2, 5, 5, 5, 5, 5];
        let result = decode_predictor(&encoded, &params).unwrap();
        assert_eq!(result, vec![10, 20, 30, 40, 50, 15, 25, 35, 45, 55]);
    }

    #[test]
    fn test_png_sub_predictor() {
        let params = DecodeParams {
            predictor: 15,
            columns: 4,
            ..Default::default()
        };
        let encoded = vec![1, 1, 1, 1, 1];
        assert_eq!(decode_predictor(&encoded, &params).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_tiff_predictor() {
        let params = DecodeParams {
            predictor: 2,
            columns: 3,
            ..Default::default()
        };
        assert_eq!(decode_predictor(&[5, 1, 1], &params).unwrap(), vec![5, 6, 7]);
    }

    #[test]
    fn test_from_object() {
        let mut dict = HashMap::new();
        dict.insert("Predictor".to_string(), Object::Integer(12));
        dict.insert("Columns".to_string(), Object::Integer(6));
        let params = DecodeParams::from_object(Some(&Object::Dictionary(dict))).unwrap();
        assert_eq!(params.predictor, 12);
        assert_eq!(params.columns, 6);
        assert_eq!(params.pixel_bytes_per_row(), 6);

        assert!(DecodeParams::from_object(None).is_none());
        let mut none = HashMap::new();
        none.insert("Predictor".to_string(), Object::Integer(1));
        assert!(DecodeParams::from_object(Some(&Object::Dictionary(none))).is_none());
    }
}
