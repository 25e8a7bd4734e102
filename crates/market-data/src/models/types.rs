use std::borrow::Cow;

/// Connector identifier - mostly static constants
pub type ConnectorId = Cow<'static, str>;
