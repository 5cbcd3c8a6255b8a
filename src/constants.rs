//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Model gateway constants
pub mod gateway {
    /// Model used when neither config nor caller names one
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

    /// Default fallback order tried after the primary model fails
    pub const DEFAULT_FALLBACK_MODELS: &[&str] = &[
        "gpt-4o-mini",
        "claude-3-haiku-20240307",
        "gemini/gemini-1.5-flash",
    ];

    /// Maximum simultaneous in-flight backend calls, process-wide
    pub const DEFAULT_MAX_CONCURRENT: usize = 10;

    /// Default sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.1;

    /// Default completion token cap
    pub const DEFAULT_MAX_TOKENS: u32 = 4096;

    /// Per-attempt request timeout (seconds)
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
}

/// Backend endpoints
pub mod network {
    pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

    pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";

    /// Google's OpenAI-compatible endpoint for Gemini models
    pub const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

    pub const ANTHROPIC_VERSION: &str = "2023-06-01";

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
}

/// Agent loop constants
pub mod agent {
    /// Default maximum model calls per `run`
    pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

    /// Returned when the iteration cap is hit and the transcript has no text
    pub const MAX_ITERATIONS_FALLBACK: &str = "Max iterations reached";

    /// Lines of source shown inline in the vulnerability prompt
    pub const SOURCE_PREVIEW_LINES: usize = 100;

    /// Maximum hits returned by `find_pattern`
    pub const MAX_PATTERN_MATCHES: usize = 20;

    /// Source excerpt sizes (characters) for context tools and prompts
    pub const DEBUG_CONTEXT_CHARS: usize = 2000;
    pub const DEBUG_PROMPT_CHARS: usize = 1500;
    pub const FLIP_CONTEXT_CHARS: usize = 2000;
    pub const FLIP_PROMPT_CHARS: usize = 1500;
    pub const HARNESS_CONTEXT_CHARS: usize = 1500;
    pub const HARNESS_PROMPT_CHARS: usize = 1000;
    pub const COVERAGE_CONTEXT_CHARS: usize = 3000;
    pub const COVERAGE_PROMPT_CHARS: usize = 2000;
    pub const EXISTING_TESTS_CHARS: usize = 1000;

    /// Existing corpus inputs listed in a flip prompt
    pub const MAX_EXISTING_INPUTS: usize = 5;

    /// Samples listed in a format inference prompt
    pub const MAX_INFER_SAMPLES: usize = 5;

    /// Uncovered line numbers listed in a coverage prompt
    pub const MAX_UNCOVERED_LINES: usize = 50;

    /// Characters of each changed file shown in a commit prompt
    pub const COMMIT_FILE_PREVIEW_CHARS: usize = 3000;
}

/// Pipeline constants
pub mod pipeline {
    /// Source extensions picked up by the project scanner
    pub const SOURCE_EXTENSIONS: &[&str] = &[
        "py", "js", "ts", "jsx", "tsx", "c", "cpp", "h", "hpp", "java", "go", "rs",
    ];

    /// Directory names never descended into (dot-directories are always skipped)
    pub const SKIPPED_DIRS: &[&str] = &["node_modules", "venv", "__pycache__", "dist", "build"];

    /// High-priority items handed to the branch flipper
    pub const FUZZ_LIMIT: usize = 5;

    /// Files whose trimmed content is shorter than this are skipped
    pub const MIN_CODE_CHARS: usize = 10;

    /// Corpus inputs considered per run
    pub const MAX_CORPUS_SAMPLES: usize = 10;

    /// Changed files whose contents are loaded for commit analysis
    pub const MAX_COMMIT_FILES: usize = 20;

    /// Path label for inline code targets
    pub const INLINE_CODE_PATH: &str = "<analyzed_code>";
}

/// Git subprocess timeouts (seconds)
pub mod git {
    pub const PROBE_TIMEOUT_SECS: u64 = 5;
    pub const DIFF_TIMEOUT_SECS: u64 = 30;
    pub const SHOW_TIMEOUT_SECS: u64 = 60;
    pub const LOG_TIMEOUT_SECS: u64 = 10;
}

/// Report storage constants
pub mod reports {
    /// Default report directory, relative to the working directory
    pub const DEFAULT_DIR: &str = ".vulnscout/reports";

    /// Aggregate stats file kept next to the reports
    pub const STATS_FILE: &str = "stats.json";
}
