use crate::register::RegisterType;

/// Default key expression prefix for the bridge.
pub const KEY_PREFIX: &str = "modbridge";

/// Builder for constructing modbridge key expressions.
///
/// Key expressions follow the pattern:
/// `<prefix>/data/<unit>/<register_type>/<address>` for data events and
/// `<prefix>/@/...` for control channels.
#[derive(Debug, Clone)]
pub struct KeyExprBuilder {
    prefix: String,
}

impl Default for KeyExprBuilder {
    fn default() -> Self {
        Self::new(KEY_PREFIX)
    }
}

impl KeyExprBuilder {
    /// Create a builder with a custom prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key for a data event.
    ///
    /// # Example
    /// ```
    /// use modbridge_common::keyexpr::KeyExprBuilder;
    /// use modbridge_common::register::RegisterType;
    ///
    /// let builder = KeyExprBuilder::default();
    /// let key = builder.data(1, RegisterType::HoldingRegister, 8);
    /// assert_eq!(key, "modbridge/data/1/holding/8");
    /// ```
    pub fn data(&self, unit: u8, register_type: RegisterType, address: u16) -> String {
        format!(
            "{}/data/{}/{}/{}",
            self.prefix,
            unit,
            register_type.as_str(),
            address
        )
    }

    /// Wildcard for every data event of one unit.
    ///
    /// # Example
    /// ```
    /// use modbridge_common::keyexpr::KeyExprBuilder;
    ///
    /// assert_eq!(KeyExprBuilder::default().unit_wildcard(3), "modbridge/data/3/**");
    /// ```
    pub fn unit_wildcard(&self, unit: u8) -> String {
        format!("{}/data/{}/**", self.prefix, unit)
    }

    /// Wildcard for every data event.
    pub fn data_wildcard(&self) -> String {
        format!("{}/data/**", self.prefix)
    }

    /// Key for error events.
    pub fn error(&self) -> String {
        format!("{}/error", self.prefix)
    }

    /// Key subscribers publish commands to.
    ///
    /// # Example
    /// ```
    /// use modbridge_common::keyexpr::KeyExprBuilder;
    ///
    /// assert_eq!(KeyExprBuilder::default().commands(), "modbridge/@/commands");
    /// ```
    pub fn commands(&self) -> String {
        format!("{}/@/commands", self.prefix)
    }

    /// Liveliness key a client holds while connected.
    pub fn client_alive(&self, client: &str) -> String {
        format!("{}/@/clients/{}", self.prefix, client)
    }

    /// Wildcard over all client liveliness tokens.
    pub fn clients_wildcard(&self) -> String {
        format!("{}/@/clients/*", self.prefix)
    }

    /// Key for bridge status.
    pub fn status(&self) -> String {
        format!("{}/@/status", self.prefix)
    }

    /// Wildcard over everything the bridge publishes.
    pub fn all(&self) -> String {
        format!("{}/**", self.prefix)
    }

    /// Extract the client id from a client liveliness key.
    pub fn parse_client_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix("/@/clients/")?;
        if rest.is_empty() || rest.contains('/') {
            return None;
        }
        Some(rest)
    }

    /// Parse a data event key back into its components.
    pub fn parse_data_key(&self, key: &str) -> Option<ParsedDataKey> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix("/data/")?;
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() != 3 {
            return None;
        }

        Some(ParsedDataKey {
            unit: parts[0].parse().ok()?,
            register_type: RegisterType::from_key_segment(parts[1])?,
            address: parts[2].parse().ok()?,
        })
    }
}

/// Parsed components of a data event key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDataKey {
    pub unit: u8,
    pub register_type: RegisterType,
    pub address: u16,
}
