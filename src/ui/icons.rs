//! Shared UI icons.
//!
//! Each icon falls back to a plain ASCII tag on terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");

// Session indicators
pub static BOOK: Emoji<'_, '_> = Emoji("📖 ", "[V]");
pub static PAGE: Emoji<'_, '_> = Emoji("📄 ", "+");
pub static REVIEW: Emoji<'_, '_> = Emoji("🔍 ", "[R]");
pub static MILESTONE: Emoji<'_, '_> = Emoji("🏁 ", "[M]");
