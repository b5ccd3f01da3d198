//! Board backend endpoint paths and storage keys

/// Default API base URL when neither config nor `API_BASE` supplies one
pub const DEFAULT_API_BASE: &str = "http://localhost:8080";

/// Renewal endpoint. Unauthenticated; the refresh cookie travels out of band.
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";

/// Username/password login, returns an access credential envelope
pub const LOGIN_PATH: &str = "/api/v1/auth/login";

/// Local account registration
pub const SIGNUP_PATH: &str = "/api/v1/auth/signup";

/// Current user profile (protected)
pub const ME_PATH: &str = "/api/v1/users/me";

/// Key under which the session is persisted
pub const AUTH_STORAGE_KEY: &str = "auth-storage";

/// Version tag written alongside the persisted session
pub const STORAGE_VERSION: u32 = 0;
