// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Length-prefixed framing of cluster messages over a blocking TCP stream.
//!
//! A frame is a big-endian `u32` payload length followed by the serialized message.

use parex_execution_exports::ExecutionError;
use parex_serialization::{DeserializeError, Deserializer, Serializer};
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// Writing half of a framed connection
pub(crate) struct MessageWriter<M, S> {
    stream: TcpStream,
    serializer: S,
    max_message_size: u32,
    _message: PhantomData<fn(&M)>,
}

impl<M, S: Serializer<M>> MessageWriter<M, S> {
    pub fn new(stream: TcpStream, serializer: S, max_message_size: u32) -> Self {
        MessageWriter {
            stream,
            serializer,
            max_message_size,
            _message: PhantomData,
        }
    }

    /// Serialize and send one message
    pub fn send(&mut self, message: &M) -> Result<(), ExecutionError> {
        let mut payload = Vec::new();
        self.serializer
            .serialize(message, &mut payload)
            .map_err(|err| ExecutionError::ProtocolError(err.to_string()))?;
        let length: u32 = payload
            .len()
            .try_into()
            .ok()
            .filter(|length| *length <= self.max_message_size)
            .ok_or_else(|| {
                ExecutionError::ProtocolError(format!(
                    "message of {} bytes exceeds the {} bytes limit",
                    payload.len(),
                    self.max_message_size
                ))
            })?;
        self.stream.write_all(&length.to_be_bytes())?;
        self.stream.write_all(&payload)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Close both directions of the connection
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Reading half of a framed connection
pub(crate) struct MessageReader<M, D> {
    stream: TcpStream,
    deserializer: D,
    max_message_size: u32,
    _message: PhantomData<fn() -> M>,
}

impl<M, D: Deserializer<M>> MessageReader<M, D> {
    pub fn new(stream: TcpStream, deserializer: D, max_message_size: u32) -> Self {
        MessageReader {
            stream,
            deserializer,
            max_message_size,
            _message: PhantomData,
        }
    }

    /// Block until the next message. A closed connection is an IO error.
    pub fn next(&mut self) -> Result<M, ExecutionError> {
        let mut length = [0u8; 4];
        self.stream.read_exact(&mut length)?;
        let length = u32::from_be_bytes(length);
        if length > self.max_message_size {
            return Err(ExecutionError::ProtocolError(format!(
                "announced message of {} bytes exceeds the {} bytes limit",
                length, self.max_message_size
            )));
        }
        let mut payload = vec![0u8; length as usize];
        self.stream.read_exact(&mut payload)?;
        let (rest, message) = self
            .deserializer
            .deserialize::<DeserializeError>(&payload)
            .map_err(|err| ExecutionError::ProtocolError(format!("invalid message: {}", err)))?;
        if !rest.is_empty() {
            return Err(ExecutionError::ProtocolError(format!(
                "{} trailing bytes after message",
                rest.len()
            )));
        }
        Ok(message)
    }

    /// Bound the wait of `next`, `None` waits forever
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<(), ExecutionError> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }
}

/// Split a connection into framed reading and writing halves
pub(crate) fn split<R, W, D, S>(
    stream: TcpStream,
    deserializer: D,
    serializer: S,
    max_message_size: u32,
) -> Result<(MessageReader<R, D>, MessageWriter<W, S>), ExecutionError>
where
    D: Deserializer<R>,
    S: Serializer<W>,
{
    let write_half = stream.try_clone()?;
    Ok((
        MessageReader::new(stream, deserializer, max_message_size),
        MessageWriter::new(write_half, serializer, max_message_size),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::messages::{
        CoordinatorMessage, CoordinatorMessageDeserializer, CoordinatorMessageSerializer,
    };
    use std::net::TcpListener;

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_frames_cross_the_wire_in_order() {
        let (client, server) = connected_pair();
        let mut writer = MessageWriter::new(client, CoordinatorMessageSerializer::new(), 1024);
        let mut reader = MessageReader::new(server, CoordinatorMessageDeserializer::new(), 1024);
        let rejected = CoordinatorMessage::Rejected {
            reason: "duplicate".to_string(),
        };
        writer.send(&rejected).unwrap();
        writer.send(&CoordinatorMessage::Shutdown).unwrap();
        assert_eq!(reader.next().unwrap(), rejected);
        assert_eq!(reader.next().unwrap(), CoordinatorMessage::Shutdown);

        writer.shutdown();
        assert!(matches!(reader.next(), Err(ExecutionError::IoError(_))));
    }

    #[test]
    fn test_oversized_frames_are_refused() {
        let (client, mut server) = connected_pair();
        let mut writer = MessageWriter::new(
            client.try_clone().unwrap(),
            CoordinatorMessageSerializer::new(),
            4,
        );
        let result = writer.send(&CoordinatorMessage::Rejected {
            reason: "a reason longer than four bytes".to_string(),
        });
        assert!(matches!(result, Err(ExecutionError::ProtocolError(_))));

        server.write_all(&1_000_000u32.to_be_bytes()).unwrap();
        let mut reader = MessageReader::new(client, CoordinatorMessageDeserializer::new(), 1024);
        assert!(matches!(
            reader.next(),
            Err(ExecutionError::ProtocolError(_))
        ));
    }
}
