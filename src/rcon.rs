//! Minimal Source RCON client as spoken by the vanilla server.
//!
//! Packets are `i32 size | i32 id | i32 type | body | 0x00 0x00`, all
//! little-endian, where `size` counts everything after itself.

use std::time::Duration;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::debug;

use crate::{
    error::RconError,
    properties::{self, Property, PropertyValue},
};

pub const RCON_HOST: &str = "127.0.0.1";
pub const DEFAULT_RCON_PORT: u16 = 25575;

const TYPE_RESPONSE: i32 = 0;
const TYPE_COMMAND: i32 = 2;
const TYPE_LOGIN: i32 = 3;

const MAX_PAYLOAD: usize = 1446;
const MAX_PACKET: i32 = 4096 + 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection details read from `server.properties`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconSettings {
    pub address: String,
    pub password: String,
}

impl RconSettings {
    /// Requires `enable-rcon=true` together with a port and a non-empty
    /// password.
    pub fn from_properties(props: &[Property]) -> Option<Self> {
        let enabled = properties::get(props, "enable-rcon")?.as_bool()?;
        if !enabled {
            return None;
        }
        let port = properties::get(props, "rcon.port")?.as_i64()?;
        let port = u16::try_from(port).ok()?;
        let password = match properties::get(props, "rcon.password")? {
            PropertyValue::Null => return None,
            value => value.to_string(),
        };
        Some(Self {
            address: format!("{RCON_HOST}:{port}"),
            password,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconResponse {
    pub body: String,
}

#[derive(Debug)]
struct Packet {
    id: i32,
    kind: i32,
    body: String,
}

#[derive(Debug)]
pub struct RconClient {
    stream: TcpStream,
    next_id: i32,
}

impl RconClient {
    pub async fn connect(address: &str) -> Result<Self, RconError> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(address))
            .await
            .map_err(|_| RconError::ConnectTimeout(address.to_string()))?
            .map_err(|source| RconError::Connect {
                address: address.to_string(),
                source,
            })?;
        debug!(%address, "rcon connected");
        Ok(Self { stream, next_id: 1 })
    }

    pub async fn login(&mut self, password: &str) -> Result<(), RconError> {
        let id = self.send(TYPE_LOGIN, password).await?;
        loop {
            let packet = self.receive().await?;
            // some servers send an empty response before the auth reply
            if packet.kind == TYPE_RESPONSE && packet.id == id {
                continue;
            }
            if packet.id == -1 || packet.id != id {
                return Err(RconError::AuthFailed);
            }
            return Ok(());
        }
    }

    pub async fn command(&mut self, text: &str) -> Result<RconResponse, RconError> {
        let id = self.send(TYPE_COMMAND, text).await?;
        loop {
            let packet = self.receive().await?;
            if packet.id == -1 {
                return Err(RconError::AuthFailed);
            }
            if packet.id == id {
                return Ok(RconResponse { body: packet.body });
            }
        }
    }

    pub async fn destroy(mut self) -> Result<(), RconError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn send(&mut self, kind: i32, payload: &str) -> Result<i32, RconError> {
        let bytes = payload.as_bytes();
        if bytes.len() > MAX_PAYLOAD {
            return Err(RconError::PayloadTooLarge(bytes.len()));
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        let mut packet = Vec::with_capacity(14 + bytes.len());
        packet.extend_from_slice(&((10 + bytes.len()) as i32).to_le_bytes());
        packet.extend_from_slice(&id.to_le_bytes());
        packet.extend_from_slice(&kind.to_le_bytes());
        packet.extend_from_slice(bytes);
        packet.extend_from_slice(&[0, 0]);

        self.stream.write_all(&packet).await?;
        self.stream.flush().await?;
        Ok(id)
    }

    async fn receive(&mut self) -> Result<Packet, RconError> {
        let size = self.stream.read_i32_le().await?;
        if !(10..=MAX_PACKET).contains(&size) {
            return Err(RconError::InvalidPacket(size));
        }
        let id = self.stream.read_i32_le().await?;
        let kind = self.stream.read_i32_le().await?;

        let mut payload = vec![0u8; (size - 8) as usize];
        self.stream.read_exact(&mut payload).await?;
        // body is followed by two NUL terminators
        payload.truncate(payload.len().saturating_sub(2));

        Ok(Packet {
            id,
            kind,
            body: String::from_utf8_lossy(&payload).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn read_packet(stream: &mut TcpStream) -> (i32, i32, String) {
        let size = stream.read_i32_le().await.unwrap();
        let id = stream.read_i32_le().await.unwrap();
        let kind = stream.read_i32_le().await.unwrap();
        let mut body = vec![0u8; (size - 8) as usize];
        stream.read_exact(&mut body).await.unwrap();
        body.truncate(body.len() - 2);
        (id, kind, String::from_utf8(body).unwrap())
    }

    async fn write_packet(stream: &mut TcpStream, id: i32, kind: i32, body: &str) {
        stream.write_i32_le(10 + body.len() as i32).await.unwrap();
        stream.write_i32_le(id).await.unwrap();
        stream.write_i32_le(kind).await.unwrap();
        stream.write_all(body.as_bytes()).await.unwrap();
        stream.write_all(&[0, 0]).await.unwrap();
    }

    /// Accepts one connection; password "secret" is the only valid login.
    async fn fake_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (id, kind, password) = read_packet(&mut stream).await;
            assert_eq!(kind, TYPE_LOGIN);
            if password != "secret" {
                write_packet(&mut stream, -1, TYPE_COMMAND, "").await;
                return;
            }
            write_packet(&mut stream, id, TYPE_COMMAND, "").await;
            while let Ok(size) = stream.read_i32_le().await {
                let id = stream.read_i32_le().await.unwrap();
                let _kind = stream.read_i32_le().await.unwrap();
                let mut body = vec![0u8; (size - 8) as usize];
                stream.read_exact(&mut body).await.unwrap();
                body.truncate(body.len() - 2);
                let reply = format!("echo: {}", String::from_utf8_lossy(&body));
                write_packet(&mut stream, id, TYPE_RESPONSE, &reply).await;
            }
        });
        address
    }

    #[tokio::test]
    async fn login_and_command() {
        let address = fake_server().await;
        let mut client = RconClient::connect(&address).await.unwrap();
        client.login("secret").await.unwrap();

        let response = client.command("list").await.unwrap();
        assert_eq!(response.body, "echo: list");
        let response = client.command("say hi").await.unwrap();
        assert_eq!(response.body, "echo: say hi");

        client.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn bad_password_is_rejected() {
        let address = fake_server().await;
        let mut client = RconClient::connect(&address).await.unwrap();
        let err = client.login("wrong").await.unwrap_err();
        assert!(matches!(err, RconError::AuthFailed));
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);
        let err = RconClient::connect(&address).await.unwrap_err();
        assert!(matches!(
            err,
            RconError::Connect { .. } | RconError::ConnectTimeout(_)
        ));
    }

    #[test]
    fn settings_need_all_three_properties() {
        let props = properties::parse("enable-rcon=true\nrcon.port=25575\nrcon.password=hunter2\n");
        assert_eq!(
            RconSettings::from_properties(&props),
            Some(RconSettings {
                address: "127.0.0.1:25575".into(),
                password: "hunter2".into()
            })
        );

        let disabled = properties::parse("enable-rcon=false\nrcon.port=25575\nrcon.password=x\n");
        assert_eq!(RconSettings::from_properties(&disabled), None);

        let no_password = properties::parse("enable-rcon=true\nrcon.port=25575\nrcon.password=\n");
        assert_eq!(RconSettings::from_properties(&no_password), None);

        let no_port = properties::parse("enable-rcon=true\nrcon.password=x\n");
        assert_eq!(RconSettings::from_properties(&no_port), None);
    }
}
