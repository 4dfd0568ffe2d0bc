pub const CONFIG_VERSION: u32 = 1;

pub fn default_version() -> u32 {
    CONFIG_VERSION
}

pub fn default_base_url() -> String {
    "http://127.0.0.1:8001".to_string()
}

pub fn default_timeout_sec() -> u64 {
    600 // question and plan generation run a local model
}

pub fn default_max_attempts() -> u32 {
    3
}

pub fn default_backoff_base_ms() -> u64 {
    1000
}

pub fn default_true() -> bool {
    true
}
