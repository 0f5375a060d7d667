// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! UDP and TCP transports for the [`Server`].
//!
//! Each received message is handed to the server on the blocking
//! thread pool, since handling an update performs file I/O. TCP
//! messages use the standard two-octet length framing; a connection
//! serves messages until the client closes it or goes idle.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;

use super::{Server, Transport};

/// How long a TCP connection may sit idle (or dribble a message)
/// before it is dropped.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Binds the UDP socket and TCP listener on `bind` and serves until an
/// I/O error on one of the accept paths. Runs forever on success;
/// shutdown is the caller's business (see the binary's run module).
pub async fn run(server: Arc<Server>, bind: SocketAddr) -> io::Result<()> {
    let udp = UdpSocket::bind(bind).await?;
    let tcp = TcpListener::bind(bind).await?;
    info!("listening on {} (UDP and TCP)", bind);
    tokio::try_join!(
        udp_loop(server.clone(), udp),
        tcp_loop(server, tcp),
    )?;
    Ok(())
}

async fn udp_loop(server: Arc<Server>, socket: UdpSocket) -> io::Result<()> {
    let socket = Arc::new(socket);
    // Large enough for any legal DNS message; responses are truncated
    // to 512 octets separately.
    let mut buf = vec![0u8; u16::MAX as usize];
    loop {
        let (len, remote) = socket.recv_from(&mut buf).await?;
        let request = buf[..len].to_vec();
        let server = server.clone();
        let socket = socket.clone();
        tokio::spawn(async move {
            let response = tokio::task::spawn_blocking(move || {
                server.handle_message(&request, remote.ip(), Transport::Udp)
            })
            .await
            .unwrap_or(None);
            if let Some(response) = response {
                if let Err(e) = socket.send_to(&response, remote).await {
                    warn!("failed to send UDP response to {}: {}", remote, e);
                }
            }
        });
    }
}

async fn tcp_loop(server: Arc<Server>, listener: TcpListener) -> io::Result<()> {
    loop {
        let (stream, remote) = listener.accept().await?;
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_tcp_connection(server, stream, remote).await {
                warn!("TCP connection from {} failed: {}", remote, e);
            }
        });
    }
}

async fn serve_tcp_connection(
    server: Arc<Server>,
    mut stream: TcpStream,
    remote: SocketAddr,
) -> io::Result<()> {
    loop {
        let mut len_buf = [0u8; 2];
        match timeout(TCP_TIMEOUT, stream.read_exact(&mut len_buf)).await {
            Err(_) => return Ok(()),
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => return Err(e),
            Ok(Ok(_)) => (),
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut request = vec![0u8; len];
        timeout(TCP_TIMEOUT, stream.read_exact(&mut request))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "message read timed out"))??;

        let handling_server = server.clone();
        let response = tokio::task::spawn_blocking(move || {
            handling_server.handle_message(&request, remote.ip(), Transport::Tcp)
        })
        .await
        .unwrap_or(None);
        match response {
            Some(response) => {
                stream
                    .write_all(&(response.len() as u16).to_be_bytes())
                    .await?;
                stream.write_all(&response).await?;
            }
            // A message we would not answer over UDP ends the
            // connection over TCP.
            None => return Ok(()),
        }
    }
}
