// Secret store: OAuth client registrations and user refresh tokens
pub mod store;

// Whole-file encryption of the store for at-rest distribution
pub mod codec;

// Refresh-token -> access-token exchange
pub mod issuer;

// Integrated external services and their token endpoints
pub mod provider;

// Administrative store lifecycle (encrypt/decrypt, key handling)
pub mod provision;

// Environment-driven configuration
pub mod config;
