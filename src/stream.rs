//! Pull-based decoding of newline-delimited JSON response bodies.
//!
//! A [`LineStream`] reads one line at a time from the body, so a long generation
//! is never buffered in full. The body is released exactly once: when the final
//! `done` record is decoded, when the body ends, when a line fails to decode or
//! read, when the caller calls [`LineStream::close`], or when the stream is dropped.

use std::io::{BufRead, BufReader};
use std::iter::FusedIterator;
use std::marker::PhantomData;

use reqwest::blocking::Response;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::{OllamaError, OllamaResult, Phase};
use crate::models::response::{ChatResponse, GenerateResponse};

/// A record type that can appear on a streamed response body.
pub trait StreamRecord: DeserializeOwned {
    /// Whether this is the final record of the stream.
    fn is_done(&self) -> bool;
}

impl StreamRecord for GenerateResponse {
    fn is_done(&self) -> bool {
        self.done
    }
}

impl StreamRecord for ChatResponse {
    fn is_done(&self) -> bool {
        self.done
    }
}

/// An iterator of `T` records decoded from a newline-delimited JSON body.
///
/// Each call to `next` reads at most one record. The stream ends after the
/// `done` record, at the end of the body, or after the first error.
pub struct LineStream<T, R = BufReader<Response>> {
    body: Option<R>,
    phase: Phase,
    line: Vec<u8>,
    _record: PhantomData<fn() -> T>,
}

pub type GenerateStream = LineStream<GenerateResponse>;

impl<T: StreamRecord> LineStream<T> {
    pub(crate) fn from_response(response: Response, phase: Phase) -> Self {
        Self::open(BufReader::new(response), phase)
    }
}

impl<T: StreamRecord, R: BufRead> LineStream<T, R> {
    /// Decode records from `body`; read failures are attributed to `phase`.
    pub fn open(body: R, phase: Phase) -> Self {
        Self {
            body: Some(body),
            phase,
            line: Vec::new(),
            _record: PhantomData,
        }
    }

    /// Release the underlying body. Later calls do nothing.
    pub fn close(&mut self) {
        if let Some(body) = self.body.take() {
            drop(body);
            debug!(phase = %self.phase, "closed response stream");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.body.is_none()
    }

    fn fail(&mut self, err: OllamaError) -> Option<OllamaResult<T>> {
        self.close();
        Some(Err(err))
    }
}

impl<T: StreamRecord, R: BufRead> Iterator for LineStream<T, R> {
    type Item = OllamaResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let body = self.body.as_mut()?;
            self.line.clear();

            match body.read_until(b'\n', &mut self.line) {
                Ok(0) => {
                    self.close();
                    return None;
                }
                Ok(_) => {}
                Err(err) => {
                    let err = OllamaError::from_io(err, self.phase);
                    return self.fail(err);
                }
            }

            let line = self.line.trim_ascii();
            if line.is_empty() {
                continue;
            }

            // A line cut short by the server closing early fails here too,
            // as does one that is not valid UTF-8
            return match serde_json::from_slice::<T>(line) {
                Ok(record) => {
                    if record.is_done() {
                        self.close();
                    }
                    Some(Ok(record))
                }
                Err(err) => self.fail(OllamaError::Decode(err)),
            };
        }
    }
}

impl<T: StreamRecord, R: BufRead> FusedIterator for LineStream<T, R> {}

/// The records of one streamed chat turn: either a single message produced by
/// an agent, or the model's streamed response.
pub enum ChatStream<R = BufReader<Response>> {
    Agent(Option<ChatResponse>),
    Model(LineStream<ChatResponse, R>),
}

impl<R: BufRead> ChatStream<R> {
    pub fn close(&mut self) {
        match self {
            ChatStream::Agent(pending) => {
                pending.take();
            }
            ChatStream::Model(stream) => stream.close(),
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, ChatStream::Agent(_))
    }
}

impl<R: BufRead> Iterator for ChatStream<R> {
    type Item = OllamaResult<ChatResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ChatStream::Agent(pending) => pending.take().map(Ok),
            ChatStream::Model(stream) => stream.next(),
        }
    }
}

impl<R: BufRead> FusedIterator for ChatStream<R> {}
