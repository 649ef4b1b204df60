//! In-memory [`HttpTransport`] that answers from a script and records every
//! request, for exercising the snapshot protocol without a server.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    io::{Cursor, Write},
};

use serde_json::Value;

use crate::error::{ExtractError, Result};

use super::transport::HttpTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

/// Responses are queued per method and URL and handed out in order. A request
/// with nothing queued fails with HTTP 404.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: RefCell<HashMap<(bool, String), VecDeque<Result<Vec<u8>>>>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_post(self, url: &str, response: Result<Vec<u8>>) -> Self {
        self.enqueue(true, url, response)
    }

    pub fn on_get(self, url: &str, response: Result<Vec<u8>>) -> Self {
        self.enqueue(false, url, response)
    }

    pub fn on_get_json(self, url: &str, body: Value) -> Self {
        self.on_get(url, Ok(body.to_string().into_bytes()))
    }

    fn enqueue(self, is_post: bool, url: &str, response: Result<Vec<u8>>) -> Self {
        self.responses
            .borrow_mut()
            .entry((is_post, url.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|request| request.method == method && request.url == url)
            .count()
    }

    fn respond(&self, is_post: bool, url: &str) -> Result<Vec<u8>> {
        self.responses
            .borrow_mut()
            .get_mut(&(is_post, url.to_string()))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(ExtractError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                })
            })
    }
}

impl HttpTransport for ScriptedTransport {
    fn post_json(&self, url: &str, body: &Value) -> Result<Vec<u8>> {
        self.requests.borrow_mut().push(RecordedRequest {
            method: Method::Post,
            url: url.to_string(),
            body: Some(body.clone()),
        });
        self.respond(true, url)
    }

    /// Recorded with the form fields as a JSON object body.
    fn post_form(&self, url: &str, fields: &[(&str, &str)]) -> Result<Vec<u8>> {
        let body: serde_json::Map<String, Value> = fields
            .iter()
            .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
            .collect();
        self.requests.borrow_mut().push(RecordedRequest {
            method: Method::Post,
            url: url.to_string(),
            body: Some(Value::Object(body)),
        });
        self.respond(true, url)
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.borrow_mut().push(RecordedRequest {
            method: Method::Get,
            url: url.to_string(),
            body: None,
        });
        self.respond(false, url)
    }
}

/// Builds a zip archive holding the given `(name, contents)` entries.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
