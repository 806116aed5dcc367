//! Method-call messages: decoding into [`Call`]s and encoding replies
//!
//! A message is a method name plus a JSON argument value. Simple methods take
//! a bare value (`info` takes the document id), the rest take a map with
//! camelCase keys. Replies are wrapped in an envelope:
//! `{"ok": value}` or `{"error": {"code": ..., "message": ...}}`.

use std::path::PathBuf;

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::backend::PdfBackend;
use crate::buffers::BufferHandle;
use crate::engine::{Call, Engine, Pixels, Reply};
use crate::error::{BridgeError, BridgeResult};
use crate::raster::RenderRequest;
use crate::registry::{DocumentId, SlotKey, TextureId};
use crate::texture::TextureUpdate;
use crate::viewport::Viewport;

/// Accepted spellings of the anti-aliasing flag
const ANTIALIAS_KEYS: [&str; 2] = ["allowAntialiasing", "allowAntialiasingIOS"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub args: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, args: Value) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }

    pub fn decode(&self) -> BridgeResult<Call> {
        decode(&self.method, &self.args)
    }
}

/// Decodes and runs `call` on `engine`, returning the reply envelope.
pub fn respond<B: PdfBackend>(engine: &mut Engine<B>, call: &MethodCall) -> Value {
    envelope(call.decode().and_then(|call| engine.execute(call)))
}

pub fn decode(method: &str, args: &Value) -> BridgeResult<Call> {
    let call = match method {
        "file" => Call::OpenFile(PathBuf::from(string_arg(method, args)?)),
        "data" => Call::OpenData(bytes_arg(args)?),
        "asset" => Call::OpenAsset(string_arg(method, args)?.to_string()),
        "info" => Call::Info(DocumentId(key_arg(method, args)?)),
        // a missing id closes nothing and is still acknowledged
        "close" if args.is_null() => Call::Close(DocumentId(SlotKey::INVALID)),
        "close" => Call::Close(DocumentId(key_arg(method, args)?)),
        "page" => {
            let args = Args::new(method, args)?;
            Call::Page {
                doc_id: args.doc_id()?,
                page_number: args.required_i64("pageNumber")?,
            }
        }
        "render" => {
            let args = Args::new(method, args)?;
            Call::Render {
                doc_id: args.doc_id()?,
                page_number: args.required_i64("pageNumber")?,
                request: RenderRequest {
                    viewport: Viewport {
                        x: args.i32_or("x", 0)?,
                        y: args.i32_or("y", 0)?,
                        width: args.extent_or_default("width")?,
                        height: args.extent_or_default("height")?,
                        full_width: args.f64_or("fullWidth", 0.0)?,
                        full_height: args.f64_or("fullHeight", 0.0)?,
                    },
                    background_fill: args.bool_or("backgroundFill", true)?,
                    antialias: args.antialias()?,
                },
            }
        }
        "releaseBuffer" => {
            let handle = key_arg(method, args)?.raw();
            Call::ReleaseBuffer(BufferHandle::new(handle))
        }
        "allocTex" => Call::AllocTexture,
        "releaseTex" => Call::ReleaseTexture(TextureId(key_arg(method, args)?)),
        "resizeTex" => {
            let args = Args::new(method, args)?;
            Call::ResizeTexture {
                tex_id: args.tex_id()?,
                width: args.required_u32("width")?,
                height: args.required_u32("height")?,
            }
        }
        "updateTex" => decode_update(&Args::new(method, args)?)?,
        other => return Err(BridgeError::NotImplemented(other.to_string())),
    };
    Ok(call)
}

fn decode_update(args: &Args<'_>) -> BridgeResult<Call> {
    let (Some(width), Some(height)) = (args.u32_opt("width")?, args.u32_opt("height")?) else {
        return Err(BridgeError::invalid("updateTex requires width and height"));
    };
    let tex_size = match (args.u32_opt("texWidth")?, args.u32_opt("texHeight")?) {
        (Some(w), Some(h)) => Some((w, h)),
        _ => None,
    };

    Ok(Call::UpdateTexture {
        tex_id: args.tex_id()?,
        doc_id: args.doc_id()?,
        page_number: args.required_i64("pageNumber")?,
        update: TextureUpdate {
            dest_x: args.u32_or("destX", 0)?,
            dest_y: args.u32_or("destY", 0)?,
            width,
            height,
            src_x: args.i32_or("srcX", 0)?,
            src_y: args.i32_or("srcY", 0)?,
            full_width: args.f64_opt("fullWidth")?,
            full_height: args.f64_opt("fullHeight")?,
            background_fill: args.bool_or("backgroundFill", true)?,
            antialias: args.antialias()?,
        },
        tex_size,
    })
}

fn string_arg<'a>(method: &str, args: &'a Value) -> BridgeResult<&'a str> {
    args.as_str()
        .ok_or_else(|| BridgeError::invalid(format!("{method} expects a string argument")))
}

fn key_arg(method: &str, args: &Value) -> BridgeResult<SlotKey> {
    as_key(args).ok_or_else(|| BridgeError::invalid(format!("{method} expects an integer id")))
}

/// Ids are 64-bit patterns; callers with signed integers may send them
/// negative.
fn as_key(value: &Value) -> Option<SlotKey> {
    value
        .as_u64()
        .or_else(|| value.as_i64().map(|v| v as u64))
        .map(SlotKey::from_raw)
}

fn bytes_arg(args: &Value) -> BridgeResult<Vec<u8>> {
    match args {
        Value::String(encoded) => BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| BridgeError::invalid(format!("data is not valid base64: {e}"))),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| BridgeError::invalid("data array must contain bytes"))
            })
            .collect(),
        _ => Err(BridgeError::invalid("data expects a byte array")),
    }
}

/// Keyed arguments of one call
struct Args<'a> {
    method: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Args<'a> {
    fn new(method: &'a str, args: &'a Value) -> BridgeResult<Self> {
        let map = args
            .as_object()
            .ok_or_else(|| BridgeError::invalid(format!("{method} expects a map argument")))?;
        Ok(Self { method, map })
    }

    /// Absent and `null` both count as missing.
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn bad(&self, key: &str, expected: &str) -> BridgeError {
        BridgeError::invalid(format!("{}: {key} must be {expected}", self.method))
    }

    fn missing(&self, key: &str) -> BridgeError {
        BridgeError::invalid(format!("{}: missing argument {key}", self.method))
    }

    fn i64_opt(&self, key: &str) -> BridgeResult<Option<i64>> {
        self.get(key)
            .map(|v| {
                v.as_i64()
                    .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .ok_or_else(|| self.bad(key, "an integer"))
            })
            .transpose()
    }

    fn required_i64(&self, key: &str) -> BridgeResult<i64> {
        self.i64_opt(key)?.ok_or_else(|| self.missing(key))
    }

    fn i32_or(&self, key: &str, default: i32) -> BridgeResult<i32> {
        match self.i64_opt(key)? {
            Some(v) => i32::try_from(v).map_err(|_| self.bad(key, "a 32-bit integer")),
            None => Ok(default),
        }
    }

    fn u32_opt(&self, key: &str) -> BridgeResult<Option<u32>> {
        self.i64_opt(key)?
            .map(|v| u32::try_from(v).map_err(|_| self.bad(key, "a non-negative integer")))
            .transpose()
    }

    fn u32_or(&self, key: &str, default: u32) -> BridgeResult<u32> {
        Ok(self.u32_opt(key)?.unwrap_or(default))
    }

    /// Output side where zero or a negative value selects the default.
    fn extent_or_default(&self, key: &str) -> BridgeResult<u32> {
        match self.i64_opt(key)? {
            Some(v) if v > 0 => u32::try_from(v).map_err(|_| self.bad(key, "a 32-bit integer")),
            _ => Ok(0),
        }
    }

    fn required_u32(&self, key: &str) -> BridgeResult<u32> {
        self.u32_opt(key)?.ok_or_else(|| self.missing(key))
    }

    fn f64_opt(&self, key: &str) -> BridgeResult<Option<f64>> {
        self.get(key)
            .map(|v| v.as_f64().ok_or_else(|| self.bad(key, "a number")))
            .transpose()
    }

    fn f64_or(&self, key: &str, default: f64) -> BridgeResult<f64> {
        Ok(self.f64_opt(key)?.unwrap_or(default))
    }

    fn bool_or(&self, key: &str, default: bool) -> BridgeResult<bool> {
        match self.get(key) {
            Some(v) => v.as_bool().ok_or_else(|| self.bad(key, "a boolean")),
            None => Ok(default),
        }
    }

    fn antialias(&self) -> BridgeResult<bool> {
        match ANTIALIAS_KEYS.iter().find(|key| self.get(key).is_some()) {
            Some(key) => self.bool_or(key, true),
            None => Ok(true),
        }
    }

    fn key(&self, key: &str) -> BridgeResult<SlotKey> {
        let value = self.get(key).ok_or_else(|| self.missing(key))?;
        as_key(value).ok_or_else(|| self.bad(key, "an integer id"))
    }

    fn doc_id(&self) -> BridgeResult<DocumentId> {
        self.key("docId").map(DocumentId)
    }

    fn tex_id(&self) -> BridgeResult<TextureId> {
        self.key("texId").map(TextureId)
    }
}

/// JSON value of a successful reply
#[must_use]
pub fn encode_reply(reply: &Reply) -> Value {
    match reply {
        Reply::Document(info) => json!({
            "docId": info.doc_id.0.raw(),
            "pageCount": info.meta.page_count,
            "verMajor": info.meta.version_major,
            "verMinor": info.meta.version_minor,
            "isEncrypted": info.meta.is_encrypted,
            "allowsCopying": info.meta.allows_copying,
            "allowsPrinting": info.meta.allows_printing,
            "isUnlocked": info.meta.is_unlocked,
        }),
        Reply::Page(page) => json!({
            "docId": page.doc_id.0.raw(),
            "pageNumber": page.page_number,
            "width": page.width,
            "height": page.height,
        }),
        Reply::Render(output) => {
            let mut value = json!({
                "docId": output.doc_id.0.raw(),
                "pageNumber": output.page_number,
                "x": output.x,
                "y": output.y,
                "width": output.width,
                "height": output.height,
                "fullWidth": output.full_width,
                "fullHeight": output.full_height,
                "pageWidth": output.page_width,
                "pageHeight": output.page_height,
            });
            let (addr, size) = match &output.pixels {
                Pixels::Inline(bytes) => {
                    value["data"] = Value::String(BASE64_STANDARD.encode(bytes));
                    (0, bytes.len())
                }
                Pixels::Parked { handle, size } => (handle.0, *size),
            };
            value["addr"] = json!(addr);
            value["size"] = json!(size);
            value
        }
        Reply::Texture(tex_id) => json!(tex_id.0.raw()),
        Reply::Acknowledged => json!(0),
        Reply::Empty => Value::Null,
    }
}

#[must_use]
pub fn encode_error(error: &BridgeError) -> Value {
    json!({
        "error": {
            "code": error.code(),
            "message": error.to_string(),
        }
    })
}

#[must_use]
pub fn envelope(result: BridgeResult<Reply>) -> Value {
    match result {
        Ok(reply) => json!({ "ok": encode_reply(&reply) }),
        Err(e) => encode_error(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_arguments_default_like_the_wire_protocol() {
        let call = decode("render", &json!({"docId": 7, "pageNumber": 1})).unwrap();
        let Call::Render {
            doc_id,
            page_number,
            request,
        } = call
        else {
            panic!("expected render");
        };
        assert_eq!(doc_id.0.raw(), 7);
        assert_eq!(page_number, 1);
        assert_eq!(request, RenderRequest::default());
    }

    #[test]
    fn antialias_alias_is_accepted() {
        let call = decode(
            "render",
            &json!({"docId": 1, "pageNumber": 1, "allowAntialiasingIOS": false}),
        )
        .unwrap();
        assert!(matches!(call, Call::Render { request, .. } if !request.antialias));
    }

    #[test]
    fn update_requires_dimensions() {
        let args = json!({"texId": 1, "docId": 2, "pageNumber": 1, "width": 10});
        let err = decode("updateTex", &args).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[test]
    fn update_resizes_only_with_both_texture_dimensions() {
        let base = json!({
            "texId": 1, "docId": 2, "pageNumber": 1,
            "width": 10, "height": 10, "texWidth": 20
        });
        assert!(matches!(
            decode("updateTex", &base).unwrap(),
            Call::UpdateTexture { tex_size: None, .. }
        ));

        let mut both = base;
        both["texHeight"] = json!(30);
        assert!(matches!(
            decode("updateTex", &both).unwrap(),
            Call::UpdateTexture {
                tex_size: Some((20, 30)),
                ..
            }
        ));
    }

    #[test]
    fn data_accepts_arrays_and_base64() {
        let from_array = bytes_arg(&json!([1, 2, 255])).unwrap();
        let from_string = bytes_arg(&json!(BASE64_STANDARD.encode([1u8, 2, 255]))).unwrap();
        assert_eq!(from_array, vec![1, 2, 255]);
        assert_eq!(from_array, from_string);
        assert!(bytes_arg(&json!([256])).is_err());
        assert!(bytes_arg(&json!({})).is_err());
    }

    #[test]
    fn negative_ids_keep_their_bit_pattern() {
        let call = decode("info", &json!(-1)).unwrap();
        assert!(matches!(call, Call::Info(DocumentId(key)) if key == SlotKey::INVALID));
    }

    #[test]
    fn wrong_types_are_rejected() {
        let err = decode("page", &json!({"docId": 1, "pageNumber": "one"})).unwrap_err();
        assert!(err.to_string().contains("pageNumber"));
        assert!(decode("render", &json!({"docId": 1, "pageNumber": 1, "width": 1.5})).is_err());
        assert!(decode("info", &json!("1")).is_err());
    }

    #[test]
    fn non_positive_render_size_selects_the_default() {
        let args = json!({"docId": 1, "pageNumber": 1, "width": -5, "height": -1});
        let Call::Render { request, .. } = decode("render", &args).unwrap() else {
            panic!("expected render");
        };
        assert_eq!((request.viewport.width, request.viewport.height), (0, 0));

        let args = json!({"docId": 1, "pageNumber": 1, "width": 0, "height": 12});
        let Call::Render { request, .. } = decode("render", &args).unwrap() else {
            panic!("expected render");
        };
        assert_eq!((request.viewport.width, request.viewport.height), (0, 12));
    }

    #[test]
    fn close_without_id_is_a_no_op() {
        let call = decode("close", &Value::Null).unwrap();
        assert!(matches!(call, Call::Close(DocumentId(key)) if key == SlotKey::INVALID));
        assert!(decode("close", &json!("7")).is_err());
    }

    #[test]
    fn unknown_methods_are_not_implemented() {
        let err = decode("getOutline", &Value::Null).unwrap_err();
        assert_eq!(err.code(), "not_implemented");
        assert_eq!(
            encode_error(&err)["error"]["code"],
            json!("not_implemented")
        );
    }

    #[test]
    fn inline_pixels_carry_data_and_zero_address() {
        let output = crate::engine::RenderOutput {
            doc_id: DocumentId(SlotKey::from_raw(3)),
            page_number: 1,
            x: 0,
            y: 0,
            width: 1,
            height: 1,
            full_width: 1.0,
            full_height: 1.0,
            page_width: 1.0,
            page_height: 1.0,
            pixels: Pixels::Inline(vec![0xFF; 4]),
        };
        let value = encode_reply(&Reply::Render(output.clone()));
        assert_eq!(value["addr"], json!(0));
        assert_eq!(value["size"], json!(4));
        assert_eq!(value["data"], json!("/////w=="));

        let parked = crate::engine::RenderOutput {
            pixels: Pixels::Parked {
                handle: BufferHandle::new(9),
                size: 4,
            },
            ..output
        };
        let value = encode_reply(&Reply::Render(parked));
        assert_eq!(value["addr"], json!(9));
        assert!(value.get("data").is_none());
    }

    #[test]
    fn acknowledgements_encode_as_wire_values() {
        assert_eq!(envelope(Ok(Reply::Acknowledged)), json!({"ok": 0}));
        assert_eq!(envelope(Ok(Reply::Empty)), json!({"ok": null}));
    }
}
