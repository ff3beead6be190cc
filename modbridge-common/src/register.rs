use serde::{Deserialize, Serialize};

/// The four Modbus data tables.
///
/// Ordering follows declaration order and is part of the cache key, so
/// cells of different types at the same address never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegisterType {
    /// Discrete output coils (read/write, 1-bit).
    Coil,
    /// Discrete input contacts (read-only, 1-bit).
    DiscreteInput,
    /// Holding registers (read/write, 16-bit).
    HoldingRegister,
    /// Input registers (read-only, 16-bit).
    InputRegister,
}

impl RegisterType {
    /// Get the string representation used in key expressions.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterType::Coil => "coil",
            RegisterType::DiscreteInput => "discrete",
            RegisterType::HoldingRegister => "holding",
            RegisterType::InputRegister => "input",
        }
    }

    /// Parse the key expression segment produced by [`as_str`](Self::as_str).
    pub fn from_key_segment(segment: &str) -> Option<Self> {
        match segment {
            "coil" => Some(RegisterType::Coil),
            "discrete" => Some(RegisterType::DiscreteInput),
            "holding" => Some(RegisterType::HoldingRegister),
            "input" => Some(RegisterType::InputRegister),
            _ => None,
        }
    }

    /// Whether values of this type are single bits.
    pub fn is_bit(&self) -> bool {
        matches!(self, RegisterType::Coil | RegisterType::DiscreteInput)
    }
}

impl std::fmt::Display for RegisterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Register values as presented to subscribers.
///
/// Bit tables are shown as booleans, word tables as unsigned 16-bit values.
/// A single coil write carries a bare boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterData {
    /// Single coil state.
    Bit(bool),
    /// Coil or discrete input states.
    Bits(Vec<bool>),
    /// Holding or input register words.
    Words(Vec<u16>),
}

impl RegisterData {
    /// Present raw cell values for the given table.
    ///
    /// Non-zero raw values of a bit table become `true`.
    pub fn from_raw(register_type: RegisterType, raw: &[u16]) -> Self {
        if register_type.is_bit() {
            RegisterData::Bits(raw.iter().map(|v| *v != 0).collect())
        } else {
            RegisterData::Words(raw.to_vec())
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_type_as_str() {
        assert_eq!(RegisterType::Coil.as_str(), "coil");
        assert_eq!(RegisterType::DiscreteInput.as_str(), "discrete");
        assert_eq!(RegisterType::HoldingRegister.as_str(), "holding");
        assert_eq!(RegisterType::InputRegister.as_str(), "input");

        for t in [
            RegisterType::Coil,
            RegisterType::DiscreteInput,
            RegisterType::HoldingRegister,
            RegisterType::InputRegister,
        ] {
            assert_eq!(RegisterType::from_key_segment(t.as_str()), Some(t));
        }
        assert_eq!(RegisterType::from_key_segment("bogus"), None);
    }

    #[test]
    fn test_bit_tables_are_presented_as_booleans() {
        let data = RegisterData::from_raw(RegisterType::Coil, &[0, 1, 0]);
        assert_eq!(data, RegisterData::Bits(vec![false, true, false]));

        let data = RegisterData::from_raw(RegisterType::InputRegister, &[0, 1, 0]);
        assert_eq!(data, RegisterData::Words(vec![0, 1, 0]));
    }

    #[test]
    fn test_untagged_serialization() {
        assert_eq!(serde_json::to_string(&RegisterData::Bit(true)).unwrap(), "true");
        assert_eq!(
            serde_json::to_string(&RegisterData::Words(vec![8, 9, 10])).unwrap(),
            "[8,9,10]"
        );

        // Booleans win over words when decoding a bit array.
        let decoded: RegisterData = serde_json::from_str("[true,false]").unwrap();
        assert_eq!(decoded, RegisterData::Bits(vec![true, false]));
    }

    #[test]
    fn test_type_serde_names() {
        assert_eq!(
            serde_json::to_string(&RegisterType::HoldingRegister).unwrap(),
            "\"holdingRegister\""
        );
        let t: RegisterType = serde_json::from_str("\"discreteInput\"").unwrap();
        assert_eq!(t, RegisterType::DiscreteInput);
    }
}
