//! Configuration for SkillLite
//!
//! All configuration is read from environment variables or CLI arguments.
//! No global configuration file is used.

// This module is kept for potential future use but currently empty.
// All configuration is handled via:
// - Environment variables (SKILLBOX_SANDBOX_LEVEL, SKILLBOX_MAX_MEMORY_MB, etc.)
// - CLI arguments (--allow-network, --max-memory, --timeout, etc.)
// - Per-skill SKILL.md configuration
