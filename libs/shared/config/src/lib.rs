use std::env;
use std::fmt;
use tracing::warn;

/// Which persistence backend holds the booking ledgers and appointments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStoreKind {
    Supabase,
    Memory,
}

impl BookingStoreKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supabase" => Some(BookingStoreKind::Supabase),
            "memory" | "in-memory" => Some(BookingStoreKind::Memory),
            _ => None,
        }
    }
}

impl fmt::Display for BookingStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStoreKind::Supabase => write!(f, "supabase"),
            BookingStoreKind::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub booking_store: BookingStoreKind,
    pub server_port: u16,
    pub claim_retry_attempts: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let supabase_url = env::var("SUPABASE_URL")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            });

        let booking_store = match env::var("BOOKING_STORE") {
            Ok(value) => BookingStoreKind::parse(&value).unwrap_or_else(|| {
                warn!("BOOKING_STORE '{}' not recognised, using supabase", value);
                BookingStoreKind::Supabase
            }),
            Err(_) if supabase_url.is_empty() => {
                warn!("BOOKING_STORE not set and Supabase not configured, using in-memory store");
                BookingStoreKind::Memory
            }
            Err(_) => BookingStoreKind::Supabase,
        };

        let config = Self {
            supabase_url,
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            booking_store,
            server_port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(|| {
                    warn!("PORT not set or invalid, using default 3000");
                    3000
                }),
            claim_retry_attempts: env::var("BOOKING_CLAIM_RETRIES")
                .ok()
                .and_then(|r| r.parse().ok())
                .unwrap_or(1),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    /// True when a Supabase project is reachable for doctor profiles.
    pub fn has_supabase(&self) -> bool {
        !self.supabase_url.is_empty()
    }

    pub fn is_configured(&self) -> bool {
        let store_ready = match self.booking_store {
            BookingStoreKind::Supabase => {
                !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
            }
            BookingStoreKind::Memory => true,
        };

        store_ready && !self.supabase_jwt_secret.is_empty()
    }
}
