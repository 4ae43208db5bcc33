use hdlc::Frame;
use ppp::{LinkConfig, PppLink, Protocol};
use proptest::prelude::*;

const LOCAL_MRU: u16 = 1500;

/// One encoded option, either acceptable or not.
fn option() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        any::<u16>().prop_map(|mru| {
            let [hi, lo] = mru.to_be_bytes();
            vec![0x01, 0x04, hi, lo]
        }),
        any::<u32>().prop_map(|accm| [vec![0x02, 0x06], accm.to_be_bytes().to_vec()].concat()),
        any::<u32>().prop_map(|magic| [vec![0x05, 0x06], magic.to_be_bytes().to_vec()].concat()),
        Just(vec![0x07, 0x02]),
        Just(vec![0x08, 0x02]),
        any::<u8>().prop_map(|operation| vec![0x0D, 0x03, operation]),
        any::<u8>().prop_map(|half| vec![0x01, 0x03, half]),
        Just(vec![0x42, 0x02]),
    ]
}

fn is_refused(option: &[u8]) -> bool {
    match option[0] {
        0x01 => option.len() != 4,
        0x02 | 0x05 => option.len() != 6,
        _ => true,
    }
}

fn oversized_mru(option: &[u8]) -> bool {
    option[0] == 0x01 && option.len() == 4 && u16::from_be_bytes([option[2], option[3]]) > LOCAL_MRU
}

/// Code and body this node must answer `options` with.
fn expected_reply(options: &[Vec<u8>]) -> (u8, Vec<u8>) {
    let refused: Vec<u8> = options.iter().filter(|o| is_refused(o)).flatten().copied().collect();
    if !refused.is_empty() {
        return (0x04, refused);
    }

    let naks = options.iter().filter(|o| oversized_mru(o)).count();
    if naks > 0 {
        let nak = [0x01, 0x04, (LOCAL_MRU >> 8) as u8, LOCAL_MRU as u8];
        return (0x03, nak.repeat(naks));
    }

    (0x02, options.concat())
}

fn transmitted_payloads(link: &mut PppLink<Vec<u8>>) -> Vec<Vec<u8>> {
    link.flush_tx();
    let wire = std::mem::take(link.transport_mut());
    wire.split(|&byte| byte == 0x7E)
        .filter(|body| !body.is_empty())
        .map(|body| {
            let mut framed = vec![0x7E];
            framed.extend_from_slice(body);
            framed.push(0x7E);
            let frame = Frame::try_from(framed.as_slice()).unwrap();
            assert_eq!(frame.protocol, Protocol::Lcp);
            frame.payload
        })
        .collect()
}

proptest! {
    #[test]
    fn configure_request_gets_exactly_one_verdict(
        options in prop::collection::vec(option(), 0..6),
        identifier in any::<u8>(),
    ) {
        let config = LinkConfig::default();
        prop_assert_eq!(config.mru(), LOCAL_MRU);
        let mut link = PppLink::new(&config, Vec::new()).unwrap();

        let body = options.concat();
        let length = (4 + body.len()) as u16;
        let mut request = vec![0x01, identifier];
        request.extend_from_slice(&length.to_be_bytes());
        request.extend_from_slice(&body);

        for byte in Frame::new(Protocol::Lcp, request).to_bytes() {
            link.on_byte_received(byte);
        }
        link.process();

        let replies = transmitted_payloads(&mut link);
        prop_assert_eq!(replies.len(), 1);
        let reply = &replies[0];

        let (code, expected_body) = expected_reply(&options);
        prop_assert_eq!(reply[0], code);
        prop_assert_eq!(reply[1], identifier);
        prop_assert_eq!(usize::from(u16::from_be_bytes([reply[2], reply[3]])), reply.len());
        prop_assert_eq!(&reply[4..], expected_body.as_slice());
        prop_assert_eq!(link.lcp().is_client_configured(), code == 0x02);
    }
}
