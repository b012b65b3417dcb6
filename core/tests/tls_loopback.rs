/*
 * tls_loopback.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Strada, a blocking-style HTTP/1.1 client library.
 *
 * Strada is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Strada is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Strada.  If not, see <http://www.gnu.org/licenses/>.
 */

//! HTTPS over loopback: a `TlsSession` server with a freshly generated
//! self-signed identity, and `HttpRequest` trusting only that certificate.

mod common;

use std::io::{Read, Write};
use std::thread::{self, JoinHandle};

use common::init_tracing;
use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use strada_core::error::{AcceptError, HttpError};
use strada_core::line_reader::{LineEnding, LineReader};
use strada_core::tls::HandshakeState;
use strada_core::{HttpRequest, TcpListener, TlsContext, TlsSession};

struct Identity {
    root_pem: Vec<u8>,
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

fn identity() -> Identity {
    let CertifiedKey { cert, key_pair } =
        generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])
            .unwrap();
    Identity {
        root_pem: cert.pem().into_bytes(),
        chain: vec![CertificateDer::from(cert.der().to_vec())],
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
    }
}

/// Accept one connection, answer `responses` requests on it, then wait for the
/// client's close. Returns the request heads.
fn serve(
    mut listener: TcpListener,
    context: TlsContext,
    responses: usize,
) -> JoinHandle<Result<Vec<String>, AcceptError>> {
    thread::spawn(move || -> Result<Vec<String>, AcceptError> {
        let (socket, _) = listener.accept().unwrap();
        let mut session = TlsSession::new(context);
        session.accept(socket)?;
        assert_eq!(session.state(), HandshakeState::Established);

        let mut reader = LineReader::new(LineEnding::CrLf, 8192);
        let mut heads = Vec::new();
        for i in 0..responses {
            let mut head = String::new();
            loop {
                assert!(reader.next_line(&mut session).unwrap());
                if reader.line().is_empty() {
                    break;
                }
                head.push_str(reader.line());
                head.push_str("\r\n");
            }
            heads.push(head);
            let body = format!("secret {}", i);
            write!(
                session,
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            )
            .unwrap();
        }
        let mut rest = [0u8; 16];
        assert_eq!(session.receive(&mut rest).unwrap(), 0, "close_notify ends the stream");
        session.close();
        Ok(heads)
    })
}

fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[test]
fn https_keep_alive_over_one_session() {
    init_tracing();
    let id = identity();
    let server_ctx = TlsContext::builder()
        .use_identity(id.chain, id.key)
        .build()
        .unwrap();
    let client_ctx = TlsContext::builder()
        .add_root_pem(&id.root_pem)
        .unwrap()
        .build()
        .unwrap();
    let (listener, port) = bind();
    let server = serve(listener, server_ctx, 2);

    let mut req = HttpRequest::parse(&format!("https://127.0.0.1:{}/vault", port)).unwrap();
    req.set_tls_context(Some(client_ctx));
    req.set_keep_alive(true);
    let mut bodies = Vec::new();
    for _ in 0..2 {
        req.perform().unwrap();
        assert_eq!(req.response_code(), 200);
        let mut body = String::new();
        req.response_body().unwrap().read_to_string(&mut body).unwrap();
        bodies.push(body);
    }
    assert_eq!(bodies, ["secret 0", "secret 1"]);
    assert_eq!(req.connections_opened(), 1);
    assert!(req.tls_error().is_none());
    req.disconnect();

    let heads = server.join().unwrap().unwrap();
    assert_eq!(heads.len(), 2);
    assert!(heads[0].starts_with("GET /vault HTTP/1.1\r\n"));
    assert!(heads[1].contains("Connection: keep-alive\r\n"));
}

#[test]
fn session_to_session_exchange() {
    init_tracing();
    let id = identity();
    let server_ctx = TlsContext::builder()
        .use_identity(id.chain, id.key)
        .build()
        .unwrap();
    let client_ctx = TlsContext::builder()
        .add_root_pem(&id.root_pem)
        .unwrap()
        .build()
        .unwrap();
    let (mut listener, port) = bind();
    let server = thread::spawn(move || {
        let (socket, _) = listener.accept().unwrap();
        let mut session = TlsSession::new(server_ctx);
        session.accept(socket).unwrap();
        let mut buf = [0u8; 4];
        session.read_exact(&mut buf).unwrap();
        session.write_all(b"pong").unwrap();
        buf
    });

    let mut client = TlsSession::new(client_ctx.clone());
    client
        .connect(format!("127.0.0.1:{}", port).parse().unwrap(), "localhost")
        .unwrap();
    assert_eq!(client.state(), HandshakeState::Established);
    assert!(client_ctx.share_count() >= 2);
    client.write_all(b"ping").unwrap();
    let mut reply = [0u8; 4];
    client.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"pong");
    assert_eq!(&server.join().unwrap(), b"ping");

    client.close();
    assert_eq!(client.state(), HandshakeState::Closed);
    assert!(!client.is_valid());
}

#[test]
fn untrusted_certificate_is_a_tls_failure() {
    init_tracing();
    let id = identity();
    let server_ctx = TlsContext::builder()
        .use_identity(id.chain, id.key)
        .build()
        .unwrap();
    let (listener, port) = bind();
    let server = serve(listener, server_ctx, 0);

    // Default trust store: the self-signed root is unknown.
    let mut req = HttpRequest::parse(&format!("https://127.0.0.1:{}/", port)).unwrap();
    match req.perform() {
        Err(HttpError::Connect { source, .. }) => assert!(source.is_tls(), "got {:?}", source),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        req.tls_error(),
        Some(rustls::Error::InvalidCertificate(_))
    ));
    assert_eq!(req.connections_opened(), 0);
    assert!(server.join().unwrap().is_err());
}
