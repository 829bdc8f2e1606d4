//! # Build Script
//!
//! Embeds the Windows Application Manifest (`app.manifest`) into the final
//! executable before compilation.
//!
//! The manifest controls:
//! - DPI Awareness (High DPI support).
//! - User Account Control (UAC) behavior. We declare `asInvoker` and request
//!   elevation at runtime instead, so read-only commands never trigger a UAC prompt.
//! - Windows Version Compatibility (identifying as Win10/11 compatible).

fn main() {
    // Embeds the 'app.manifest' file as a Windows resource.
    // We ignore the result because if it fails, the app still builds, just without the manifest.
    let _ = embed_resource::compile("app.manifest", embed_resource::NONE);
}
