use dispatcher::Envelope;
use dispatcher_daemon::codec::{
    decode_frame, encode_frame, read_frame, write_frame, TunnelFrame, MAX_FRAME_LEN,
};
use tokio::io::AsyncWriteExt;

#[test]
fn encoded_frame_carries_length_prefix() {
    let frame = TunnelFrame::Request(Envelope::new(7, "g1", b"body".to_vec()));
    let bytes = encode_frame(&frame).expect("encode");

    let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    assert_eq!(len, bytes.len() - 4);

    let decoded: TunnelFrame = decode_frame(&bytes).expect("decode");
    assert_eq!(decoded, frame);
}

#[test]
fn decode_rejects_truncated_body() {
    let bytes = encode_frame(&TunnelFrame::Keepalive).expect("encode");
    let err = decode_frame::<TunnelFrame>(&bytes[..bytes.len() - 1]).expect_err("truncated");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

    let err = decode_frame::<TunnelFrame>(&bytes[..2]).expect_err("no header");
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[tokio::test]
async fn frames_stream_over_duplex_in_order() {
    let (mut client, mut server) = tokio::io::duplex(1024);

    write_frame(
        &mut client,
        &TunnelFrame::Hello {
            gateway_id: "g1".into(),
        },
    )
    .await
    .expect("hello");
    write_frame(
        &mut client,
        &TunnelFrame::Request(Envelope::new(1, "g1", vec![0xde, 0xad])),
    )
    .await
    .expect("request");

    let first: TunnelFrame = read_frame(&mut server).await.expect("first");
    let second: TunnelFrame = read_frame(&mut server).await.expect("second");
    assert_eq!(
        first,
        TunnelFrame::Hello {
            gateway_id: "g1".into()
        }
    );
    match second {
        TunnelFrame::Request(envelope) => assert_eq!(envelope.payload(), &[0xde_u8, 0xad][..]),
        other => panic!("unexpected frame {:?}", other),
    }
}

#[tokio::test]
async fn read_rejects_oversized_header() {
    let (mut client, mut server) = tokio::io::duplex(64);
    client
        .write_all(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes())
        .await
        .expect("write header");

    let err = read_frame::<_, TunnelFrame>(&mut server)
        .await
        .expect_err("oversized");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[tokio::test]
async fn read_reports_eof_on_closed_stream() {
    let (client, mut server) = tokio::io::duplex(64);
    drop(client);

    let err = read_frame::<_, TunnelFrame>(&mut server)
        .await
        .expect_err("eof");
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}
