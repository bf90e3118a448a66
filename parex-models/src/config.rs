// Copyright (c) 2022 MASSA LABS <info@massa.net>

/// Maximum length in bytes of a called method name
pub const MAX_METHOD_NAME_LENGTH: u32 = 255;
/// Maximum size in bytes of transaction parameters
pub const MAX_PARAMETERS_SIZE: u64 = 10_000_000;
/// Maximum length in bytes of a state key
pub const MAX_STATE_KEY_LENGTH: u32 = 1_024;
/// Maximum size in bytes of a state value or a return value
pub const MAX_STATE_VALUE_SIZE: u64 = 10_000_000;
/// Maximum number of state changes recorded by a single trace
pub const MAX_STATE_CHANGES_PER_TRACE: u32 = 10_000;
/// Maximum number of log lines recorded by a single trace
pub const MAX_LOGS_PER_TRACE: u32 = 1_000;
/// Maximum length in bytes of a log line or error message
pub const MAX_MESSAGE_LENGTH: u32 = 65_535;
/// Maximum length in bytes of a worker identity
pub const MAX_WORKER_ID_LENGTH: u32 = 255;
