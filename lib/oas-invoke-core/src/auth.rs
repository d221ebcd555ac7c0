use std::fmt;

use http::HeaderValue;
use reqwest::header::{AUTHORIZATION, HeaderName};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Errors that can occur while turning credentials into a request header.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display)]
pub enum AuthenticationError {
    /// Bearer token contains invalid characters for HTTP headers.
    #[display("Bearer token contains invalid characters: {message}")]
    InvalidBearerToken {
        /// Description of the invalid characters or format issue.
        message: String,
    },

    /// Basic authentication username contains invalid characters.
    #[display("Basic auth username contains invalid characters: {message}")]
    InvalidUsername {
        /// Description of the invalid characters or format issue.
        message: String,
    },

    /// Basic authentication password contains invalid characters.
    #[display("Basic auth password contains invalid characters: {message}")]
    InvalidPassword {
        /// Description of the invalid characters or format issue.
        message: String,
    },

    /// API key header name is invalid.
    #[display("Invalid API key header name '{header_name}': {message}")]
    InvalidHeaderName {
        /// The invalid header name that was provided.
        header_name: String,
        /// Description of why the header name is invalid.
        message: String,
    },

    /// API key value contains invalid characters for HTTP headers.
    #[display("API key contains invalid characters: {message}")]
    InvalidApiKey {
        /// Description of the invalid characters or format issue.
        message: String,
    },

    /// The credential bundle names an unknown authentication type.
    #[display("Unsupported authentication type '{auth_type}'")]
    UnsupportedType {
        /// The type found in the bundle.
        auth_type: String,
    },
}

/// Sensitive string zeroed on drop and never printed in full.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecureString(String);

impl SecureString {
    /// Creates a new secure string from the provided value.
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// Returns a reference to the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn mask_sensitive(value: &str) -> String {
        match (value.get(..4), value.get(value.len().saturating_sub(4)..)) {
            (Some(head), Some(tail)) if value.len() > 8 => format!("{head}...{tail}"),
            _ => "***".to_string(),
        }
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureString")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::mask_sensitive(&self.0))
    }
}

impl From<String> for SecureString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecureString {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl Serialize for SecureString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Kind of credentials carried by a [`Credentials`] bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthType {
    /// No credentials are attached.
    #[default]
    None,
    /// HTTP Basic authentication with `user` and `password`.
    Basic,
    /// `Authorization: Bearer <password>`.
    Bearer,
    /// `<user>: <password>` header, `user` being the header name.
    ApiKey,
}

impl std::str::FromStr for AuthType {
    type Err = AuthenticationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "bearer" | "token" => Ok(Self::Bearer),
            "apikey" | "api-key" | "api_key" => Ok(Self::ApiKey),
            _ => Err(AuthenticationError::UnsupportedType {
                auth_type: value.to_string(),
            }),
        }
    }
}

/// Opaque `{authType, user, password}` credential bundle.
///
/// The core does not validate credentials: it only turns them into a header
/// attached to every request (spec fetch and invocations).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Kind of credentials.
    #[serde(default)]
    pub auth_type: AuthType,
    /// User name, or header name for [`AuthType::ApiKey`].
    #[serde(default)]
    pub user: String,
    /// Password, token or key.
    #[serde(default)]
    pub password: Option<SecureString>,
}

impl Credentials {
    /// Converts the bundle into an [`Authentication`], `None` for [`AuthType::None`].
    pub fn into_authentication(self) -> Option<Authentication> {
        let Self {
            auth_type,
            user,
            password,
        } = self;
        let password = password.unwrap_or_else(|| SecureString::new(String::new()));

        match auth_type {
            AuthType::None => None,
            AuthType::Basic => Some(Authentication::Basic {
                username: user,
                password,
            }),
            AuthType::Bearer => Some(Authentication::Bearer(password)),
            AuthType::ApiKey => Some(Authentication::ApiKey {
                header_name: user,
                key: password,
            }),
        }
    }
}

/// Authentication attached to outgoing requests.
#[derive(Clone)]
pub enum Authentication {
    /// Adds `Authorization: Bearer <token>` header.
    Bearer(SecureString),

    /// Adds `Authorization: Basic <base64(username:password)>` header.
    Basic {
        /// The username for Basic authentication.
        username: String,
        /// The password for Basic authentication.
        password: SecureString,
    },

    /// Adds `<header_name>: <key>` header.
    ApiKey {
        /// The header name for the API key.
        header_name: String,
        /// The API key value.
        key: SecureString,
    },
}

impl Authentication {
    /// Converts the authentication into an HTTP header.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationError` if the authentication data contains invalid characters
    /// or cannot be properly formatted for HTTP headers.
    pub fn to_header(&self) -> Result<(HeaderName, HeaderValue), AuthenticationError> {
        match self {
            Authentication::Bearer(token) => {
                let header_value = format!("Bearer {}", token.as_str());
                let mut value = HeaderValue::from_str(&header_value).map_err(|e| {
                    AuthenticationError::InvalidBearerToken {
                        message: e.to_string(),
                    }
                })?;
                value.set_sensitive(true);
                Ok((AUTHORIZATION, value))
            }

            Authentication::Basic { username, password } => {
                if username.contains(':') {
                    return Err(AuthenticationError::InvalidUsername {
                        message: "Username cannot contain colon (:) character".to_string(),
                    });
                }

                use base64::Engine;
                let credentials_str = format!("{}:{}", username, password.as_str());
                let credentials = base64::engine::general_purpose::STANDARD.encode(credentials_str);

                let mut value = HeaderValue::from_str(&format!("Basic {credentials}")).map_err(
                    |e| AuthenticationError::InvalidPassword {
                        message: e.to_string(),
                    },
                )?;
                value.set_sensitive(true);
                Ok((AUTHORIZATION, value))
            }

            Authentication::ApiKey { header_name, key } => {
                let header = HeaderName::from_bytes(header_name.as_bytes()).map_err(|e| {
                    AuthenticationError::InvalidHeaderName {
                        header_name: header_name.clone(),
                        message: e.to_string(),
                    }
                })?;
                let mut value = HeaderValue::from_str(key.as_str()).map_err(|e| {
                    AuthenticationError::InvalidApiKey {
                        message: e.to_string(),
                    }
                })?;
                value.set_sensitive(true);
                Ok((header, value))
            }
        }
    }
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::ApiKey { header_name, .. } => f
                .debug_struct("ApiKey")
                .field("header_name", header_name)
                .field("key", &"[REDACTED]")
                .finish(),
        }
    }
}

impl fmt::Display for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(token) => write!(f, "Bearer {token}"),
            Self::Basic { username, .. } => write!(f, "Basic (username: {username})"),
            Self::ApiKey { header_name, key } => write!(f, "ApiKey ({header_name}: {key})"),
        }
    }
}
