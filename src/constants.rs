//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// On-disk configuration layout
pub mod config {
    /// Directory under the user config dir holding every tabload file
    pub const APP_DIR: &str = "tabload";

    /// Application settings document
    pub const SETTINGS_FILENAME: &str = "config.json";

    /// Named preset document
    pub const PRESETS_FILENAME: &str = "presets.json";

    /// Extension appended to the presets file when taking a backup before delete
    pub const BACKUP_EXTENSION: &str = "bak";

    /// Directory (under APP_DIR) holding local prompt templates
    pub const TEMPLATES_DIR: &str = "templates";

    /// Extension of local prompt template files
    pub const TEMPLATE_EXTENSION: &str = "txt";
}

/// Built-in defaults
pub mod defaults {
    /// API base URL used when no settings file exists yet
    pub const API_URL: &str = "http://localhost:5000";

    /// Name of the built-in preset shipped with the application
    pub const PRESET_NAME: &str = "Default Preset";

    /// Request timeout for the API client, in seconds
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// LoRA scaling used when the caller does not give one
    pub const LORA_SCALING: f64 = 1.0;
}

/// Prompt template naming
pub mod templates {
    /// Suffix appended to template names that only exist on the server
    pub const SERVER_SUFFIX: &str = " (server)";

    /// Replacement for a space in a normalized template file name
    pub const SPACE_REPLACEMENT: &str = "__";

    /// Replacement for any other disallowed character
    pub const INVALID_CHAR_REPLACEMENT: char = '-';
}

/// Model-serving API endpoints
pub mod endpoints {
    pub const API_KEY_HEADER: &str = "X-api-key";

    pub const MODEL_LIST: &str = "/v1/model/list";
    pub const DRAFT_MODEL_LIST: &str = "/v1/model/draft/list";
    pub const MODEL_CURRENT: &str = "/v1/model";
    pub const MODEL_LOAD: &str = "/v1/model/load";
    pub const MODEL_UNLOAD: &str = "/v1/model/unload";

    pub const LORA_LIST: &str = "/v1/lora/list";
    pub const LORA_CURRENT: &str = "/v1/lora";
    pub const LORA_LOAD: &str = "/v1/lora/load";
    pub const LORA_UNLOAD: &str = "/v1/lora/unload";

    pub const TEMPLATE_LIST: &str = "/v1/template/list";
    pub const TEMPLATE_SWITCH: &str = "/v1/template/switch";
    pub const TEMPLATE_UNLOAD: &str = "/v1/template/unload";
    pub const TEMPLATE_SAVE: &str = "/v1/template/save";

    pub const OVERRIDE_LIST: &str = "/v1/sampling/override/list";
    pub const OVERRIDE_SWITCH: &str = "/v1/sampling/override/switch";
    pub const OVERRIDE_UNLOAD: &str = "/v1/sampling/override/unload";

    pub const DOWNLOAD: &str = "/v1/download";
    pub const DOWNLOAD_CANCEL: &str = "/v1/download/cancel";
}

/// Logging setup
pub mod logging {
    /// Environment variable selecting the max log level
    pub const LEVEL_ENV: &str = "LOG_LEVEL";

    /// Directory (under the system temp dir) holding the log file
    pub const DIR: &str = "tabload_logs";

    pub const FILENAME: &str = "tabload.log";
}

/// Environment variables read by the binary
pub mod env {
    /// Admin key sent as X-api-key when --admin-key is not given
    pub const ADMIN_KEY: &str = "TABLOAD_ADMIN_KEY";
}
