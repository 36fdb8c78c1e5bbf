//! Form URL encoding and multipart bodies.

use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value;

/// Content type of a multipart file part.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FormPartType {
    /// `application/octet-stream`.
    #[default]
    Data,
    /// `image/png`.
    Png,
    /// `image/jpeg`.
    Jpg,
    /// Any other content type.
    Custom(String),
}

impl FormPartType {
    /// The declared `Content-Type` of the part.
    pub fn content_type(&self) -> &str {
        match self {
            Self::Data => "application/octet-stream",
            Self::Png => "image/png",
            Self::Jpg => "image/jpeg",
            Self::Custom(content_type) => content_type,
        }
    }
}

/// A named binary blob sent as a multipart file part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormDataPart {
    /// Raw contents.
    pub data: Bytes,
    /// The form field name.
    pub parameter_name: String,
    /// The file name announced to the server.
    pub filename: String,
    /// The declared content type.
    pub part_type: FormPartType,
}

impl FormDataPart {
    /// Create an `application/octet-stream` part.
    pub fn new(
        data: impl Into<Bytes>,
        parameter_name: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            data: data.into(),
            parameter_name: parameter_name.into(),
            filename: filename.into(),
            part_type: FormPartType::Data,
        }
    }

    /// Set the content type.
    pub fn with_type(mut self, part_type: FormPartType) -> Self {
        self.part_type = part_type;
        self
    }

    fn write_to(&self, boundary: &str, body: &mut BytesMut) {
        body.put_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.parameter_name,
                self.filename,
                self.part_type.content_type()
            )
            .as_bytes(),
        );
        body.put_slice(&self.data);
        body.put_slice(b"\r\n");
    }
}

/// Generate a multipart boundary token.
pub(crate) fn generate_boundary() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("Boundary-{token}")
}

/// Percent-encode the entries of a JSON object as `key=value` pairs joined
/// by `&`. Keys come out in sorted order; non-object values encode to an
/// empty string.
pub(crate) fn url_encode(parameters: &Value) -> String {
    let Value::Object(map) = parameters else {
        return String::new();
    };

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in map {
        serializer.append_pair(key, &scalar_string(value));
    }
    serializer.finish()
}

/// Build a complete multipart body: one part per scalar parameter, then the
/// file parts in order, then the closing boundary.
pub(crate) fn multipart_body(
    boundary: &str,
    parameters: Option<&Value>,
    parts: &[FormDataPart],
) -> Bytes {
    let mut body = BytesMut::new();

    if let Some(Value::Object(map)) = parameters {
        for (key, value) in map {
            body.put_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{key}\"\r\n\r\n{}\r\n",
                    scalar_string(value)
                )
                .as_bytes(),
            );
        }
    }

    for part in parts {
        part.write_to(boundary, &mut body);
    }

    body.put_slice(format!("--{boundary}--\r\n").as_bytes());
    body.freeze()
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
