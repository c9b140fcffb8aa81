//! Text codec shim for restricted render contexts.
//!
//! AudioWorklet scopes in some browsers ship without `TextDecoder` and
//! `TextEncoder`, and the engine's glue needs both while it is being
//! constructed. A [`CodecScope`] holds one slot per capability: a host may
//! provide a conforming native codec, and [`CodecScope::install`] fills any
//! slot still empty with a single-byte fallback.
//!
//! The fallback is Latin-1-like, not UTF-8: each byte decodes to the code
//! unit of equal value and each UTF-16 code unit encodes to its low byte.
//! Round trips only hold for text whose code units are all in `0..=255`;
//! anything wider is truncated on encode. Engine glue built against this
//! shim depends on that exact truncation.
//!
//! On wasm32 the same fallback is also defined as `TextDecoder` and
//! `TextEncoder` classes on `globalThis` when those are missing, since the
//! engine's JS glue looks them up there and not in the Rust registry.

use std::sync::OnceLock;

/// Decode bytes into a string.
pub trait TextDecode: Send + Sync {
    fn encoding(&self) -> &str;
    fn decode(&self, bytes: &[u8]) -> String;
}

/// Encode a string into bytes.
pub trait TextEncode: Send + Sync {
    fn encoding(&self) -> &str;
    fn encode(&self, text: &str) -> Vec<u8>;
}

/// Fallback decoder: byte `b` becomes code unit `b`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Latin1Decoder;

/// Fallback encoder: every UTF-16 code unit is masked to its low byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct Latin1Encoder;

impl TextDecode for Latin1Decoder {
    fn encoding(&self) -> &str {
        "latin1"
    }

    fn decode(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| char::from(b)).collect()
    }
}

impl TextEncode for Latin1Encoder {
    fn encoding(&self) -> &str {
        "latin1"
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        text.encode_utf16().map(|unit| (unit & 0xFF) as u8).collect()
    }
}

/// Which capabilities an [`CodecScope::install`] call actually filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShimReport {
    pub decoder_installed: bool,
    pub encoder_installed: bool,
}

impl ShimReport {
    pub fn installed_anything(&self) -> bool {
        self.decoder_installed || self.encoder_installed
    }
}

/// A set of codec capability slots. Each slot is written at most once.
pub struct CodecScope {
    decoder: OnceLock<Box<dyn TextDecode>>,
    encoder: OnceLock<Box<dyn TextEncode>>,
}

impl CodecScope {
    pub const fn new() -> Self {
        CodecScope {
            decoder: OnceLock::new(),
            encoder: OnceLock::new(),
        }
    }

    /// Register a host decoder. Returns false if the slot was already taken.
    pub fn provide_decoder(&self, decoder: Box<dyn TextDecode>) -> bool {
        self.decoder.set(decoder).is_ok()
    }

    /// Register a host encoder. Returns false if the slot was already taken.
    pub fn provide_encoder(&self, encoder: Box<dyn TextEncode>) -> bool {
        self.encoder.set(encoder).is_ok()
    }

    /// Fill every empty slot with the Latin-1 fallback.
    pub fn install(&self) -> ShimReport {
        let mut report = ShimReport::default();
        self.decoder.get_or_init(|| {
            report.decoder_installed = true;
            Box::new(Latin1Decoder)
        });
        self.encoder.get_or_init(|| {
            report.encoder_installed = true;
            Box::new(Latin1Encoder)
        });
        report
    }

    pub fn decoder(&self) -> Option<&dyn TextDecode> {
        self.decoder.get().map(|d| d.as_ref())
    }

    pub fn encoder(&self) -> Option<&dyn TextEncode> {
        self.encoder.get().map(|e| e.as_ref())
    }
}

impl Default for CodecScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Global names the engine glue looks the codecs up by.
pub const DECODER_GLOBAL: &str = "TextDecoder";
pub const ENCODER_GLOBAL: &str = "TextEncoder";

/// Body of a function returning the fallback decoder class.
pub const DECODER_CLASS: &str = "return class TextDecoder {
    constructor(encoding = 'latin1') { this.encoding = encoding; }
    decode(input) {
        if (!input) return '';
        const bytes = input instanceof Uint8Array ? input : new Uint8Array(input);
        let out = '';
        for (let i = 0; i < bytes.length; i++) out += String.fromCharCode(bytes[i]);
        return out;
    }
};";

/// Body of a function returning the fallback encoder class.
pub const ENCODER_CLASS: &str = "return class TextEncoder {
    constructor() { this.encoding = 'latin1'; }
    encode(input = '') {
        const out = new Uint8Array(input.length);
        for (let i = 0; i < input.length; i++) out[i] = input.charCodeAt(i) & 0xFF;
        return out;
    }
};";

/// A script global scope the fallback classes can be defined in.
pub trait HostScope {
    fn has(&self, name: &str) -> bool;

    /// Define `name` as the class returned by `class_source`. False on failure.
    fn define(&mut self, name: &str, class_source: &str) -> bool;
}

/// Define each fallback class the host is missing. Present globals are
/// never replaced.
pub fn install_host<H: HostScope>(host: &mut H) -> ShimReport {
    let mut report = ShimReport::default();
    if !host.has(DECODER_GLOBAL) {
        report.decoder_installed = host.define(DECODER_GLOBAL, DECODER_CLASS);
    }
    if !host.has(ENCODER_GLOBAL) {
        report.encoder_installed = host.define(ENCODER_GLOBAL, ENCODER_CLASS);
    }
    report
}

/// `globalThis` of the current JS realm.
#[cfg(target_arch = "wasm32")]
pub struct JsGlobalScope;

#[cfg(target_arch = "wasm32")]
impl HostScope for JsGlobalScope {
    fn has(&self, name: &str) -> bool {
        let global = js_sys::global();
        let key = wasm_bindgen::JsValue::from_str(name);
        js_sys::Reflect::has(&global, &key).unwrap_or(false)
            && js_sys::Reflect::get(&global, &key).is_ok_and(|v| !v.is_undefined())
    }

    fn define(&mut self, name: &str, class_source: &str) -> bool {
        let class = match js_sys::Function::new_no_args(class_source).call0(&wasm_bindgen::JsValue::UNDEFINED) {
            Ok(class) => class,
            Err(e) => {
                log::warn!("Could not build fallback {name}: {e:?}");
                return false;
            }
        };
        let key = wasm_bindgen::JsValue::from_str(name);
        js_sys::Reflect::set(&js_sys::global(), &key, &class).unwrap_or(false)
    }
}

static GLOBAL: CodecScope = CodecScope::new();

/// The process-wide scope seen by engine construction.
pub fn global() -> &'static CodecScope {
    &GLOBAL
}

/// Install missing process-wide capabilities. Safe to call any number of times.
///
/// On wasm32 this also defines the missing `globalThis` codec classes; the
/// report covers both.
pub fn install() -> ShimReport {
    #[allow(unused_mut)]
    let mut report = GLOBAL.install();
    #[cfg(target_arch = "wasm32")]
    {
        let host = install_host(&mut JsGlobalScope);
        report.decoder_installed |= host.decoder_installed;
        report.encoder_installed |= host.encoder_installed;
    }
    if report.decoder_installed {
        log::info!("Installed fallback latin1 text decoder");
    }
    if report.encoder_installed {
        log::info!("Installed fallback latin1 text encoder");
    }
    report
}

pub fn decoder() -> Option<&'static dyn TextDecode> {
    GLOBAL.decoder()
}

pub fn encoder() -> Option<&'static dyn TextEncode> {
    GLOBAL.encoder()
}

/// Decode with the process-wide decoder, installing the fallback first if needed.
pub fn decode(bytes: &[u8]) -> String {
    install();
    match GLOBAL.decoder() {
        Some(d) => d.decode(bytes),
        None => Latin1Decoder.decode(bytes),
    }
}

/// Encode with the process-wide encoder, installing the fallback first if needed.
pub fn encode(text: &str) -> Vec<u8> {
    install();
    match GLOBAL.encoder() {
        Some(e) => e.encode(text),
        None => Latin1Encoder.encode(text),
    }
}
