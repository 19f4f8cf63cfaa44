//! Card number encoding and model registry
//!
//! SI card numbers travel as three (sometimes four) bytes whose meaning
//! depends on the card generation. Series-5 cards fold a small series digit
//! into the hundred-thousands place; newer cards use the third byte as a
//! plain high byte.

use std::ops::Range;

/// Known card hardware generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CardModel {
    /// SI-Card 5
    SiCard5,
    /// SI-Card 6
    SiCard6,
    /// SI-Card 8
    SiCard8,
    /// SI-Card 9
    SiCard9,
    /// SI-Card 10
    SiCard10,
    /// SI-Card 11
    SiCard11,
    /// SIAC (active card)
    Siac,
    /// tCard
    TCard,
    /// fCard
    FCard,
}

/// Decode a card number from its little-endian wire bytes.
///
/// Accepts 3 or 4 bytes; returns `None` when the length is wrong or any
/// required byte is unknown. The third byte is a series digit for low
/// values (multiplied into the hundred-thousands) and a plain high byte
/// above 4, preserving how stations encode both card generations.
pub fn arr2card_number(arr: &[Option<u8>]) -> Option<u32> {
    if !matches!(arr.len(), 3 | 4) {
        tracing::warn!(len = arr.len(), "invalid card number array length");
        return None;
    }
    let byte0 = u32::from(arr[0]?);
    let byte1 = u32::from(arr[1]?);
    let byte2 = u32::from(arr[2]?);
    let mut card_number = (byte1 << 8) | byte0;
    let has_high_word = arr.len() == 4 && arr[3]? != 0;
    if byte2 > 4 || has_high_word {
        card_number |= byte2 << 16;
        if arr.len() == 4 {
            card_number |= u32::from(arr[3]?) << 24;
        }
    } else if byte2 > 1 {
        card_number += byte2 * 100_000;
    }
    Some(card_number)
}

/// Encode a card number into 4 wire bytes, little endian.
///
/// `None` encodes as all-unknown. The series-5 folding of
/// [`arr2card_number`] is inverted for numbers below 500 000.
pub fn card_number2arr(card_number: Option<u32>) -> [Option<u8>; 4] {
    let Some(card_number) = card_number else {
        return [None; 4];
    };
    let (low, high) = if card_number < 500_000 {
        let series = card_number / 100_000;
        if series > 1 {
            (card_number - series * 100_000, series)
        } else {
            (card_number, 0)
        }
    } else {
        (card_number & 0xffff, (card_number >> 16) & 0xffff)
    };
    [
        Some((low & 0xff) as u8),
        Some(((low >> 8) & 0xff) as u8),
        Some((high & 0xff) as u8),
        Some(((high >> 8) & 0xff) as u8),
    ]
}

/// Maps card number ranges to the card model that owns them.
///
/// Ranges must not overlap; registration order decides lookup priority for
/// a malformed overlapping registration, so keep them disjoint.
#[derive(Debug, Clone)]
pub struct CardNumberRangeRegistry {
    entries: Vec<(Range<u32>, CardModel)>,
}

impl CardNumberRangeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        CardNumberRangeRegistry {
            entries: Vec::new(),
        }
    }

    /// Register `range` as belonging to `model`
    pub fn register(&mut self, range: Range<u32>, model: CardModel) {
        self.entries.push((range, model));
    }

    /// Look up the model owning `card_number`
    pub fn lookup(&self, card_number: u32) -> Option<CardModel> {
        self.entries
            .iter()
            .find(|(range, _)| range.contains(&card_number))
            .map(|(_, model)| *model)
    }

    /// Remove all registrations
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

impl Default for CardNumberRangeRegistry {
    /// A registry preloaded with the known production number ranges
    fn default() -> Self {
        let mut registry = CardNumberRangeRegistry::new();
        registry.register(1_000..500_000, CardModel::SiCard5);
        registry.register(500_000..1_000_000, CardModel::SiCard6);
        registry.register(1_000_000..2_000_000, CardModel::SiCard9);
        registry.register(2_000_000..2_003_000, CardModel::SiCard8);
        registry.register(2_004_000..3_000_000, CardModel::SiCard8);
        registry.register(6_000_000..7_000_000, CardModel::TCard);
        registry.register(7_000_000..8_000_000, CardModel::SiCard10);
        registry.register(8_000_000..9_000_000, CardModel::Siac);
        registry.register(9_000_000..10_000_000, CardModel::SiCard11);
        registry.register(14_000_000..15_000_000, CardModel::FCard);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_series5_card_number() {
        // 234567 = series 2, remainder 34567 = 0x8707.
        let arr = [Some(0x07), Some(0x87), Some(0x02), Some(0x00)];
        assert_eq!(arr2card_number(&arr), Some(234_567));
        assert_eq!(card_number2arr(Some(234_567)), arr);
    }

    #[test]
    fn test_series1_card_number_is_plain() {
        // A series byte of 1 adds nothing to the low word.
        let arr = [Some(0x39), Some(0x30), Some(0x01), Some(0x00)];
        assert_eq!(arr2card_number(&arr), Some(0x3039));
    }

    #[test]
    fn test_modern_card_number() {
        // 8 500 000 = 0x81B320.
        let arr = [Some(0x20), Some(0xb3), Some(0x81), Some(0x00)];
        assert_eq!(arr2card_number(&arr), Some(8_500_000));
        assert_eq!(card_number2arr(Some(8_500_000)), arr);
    }

    #[test]
    fn test_unknown_bytes_propagate() {
        assert_eq!(arr2card_number(&[Some(0x01), None, Some(0x02)]), None);
        assert_eq!(arr2card_number(&[Some(0x01), Some(0x02)]), None);
        assert_eq!(card_number2arr(None), [None; 4]);
    }

    #[test]
    fn test_three_byte_form() {
        assert_eq!(
            arr2card_number(&[Some(0x07), Some(0x87), Some(0x02)]),
            Some(234_567)
        );
    }

    #[test]
    fn test_registry_lookup() {
        let registry = CardNumberRangeRegistry::default();
        assert_eq!(registry.lookup(234_567), Some(CardModel::SiCard5));
        assert_eq!(registry.lookup(2_002_999), Some(CardModel::SiCard8));
        assert_eq!(registry.lookup(2_003_500), None);
        assert_eq!(registry.lookup(8_500_000), Some(CardModel::Siac));
        assert_eq!(registry.lookup(500), None);
    }

    #[test]
    fn test_registry_register_and_reset() {
        let mut registry = CardNumberRangeRegistry::new();
        assert_eq!(registry.lookup(42), None);
        registry.register(0..100, CardModel::TCard);
        assert_eq!(registry.lookup(42), Some(CardModel::TCard));
        registry.reset();
        assert_eq!(registry.lookup(42), None);
    }
}
