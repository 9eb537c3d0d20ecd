use std::sync::Arc;
use std::thread;

use kdc::auth::crypto::KEY_LEN;
use kdc::auth::{
    ChapClient, ChapServer, Exchange, MasterKey, MemoryChannel, NonceCache, RootKey, SecretStore,
    ServiceServer, SessionKey, SessionKeyEnvelope, Ticket,
};
use kdc::protocol::{ChapChallenge, ClientHello, Message, MessageType};
use proptest::prelude::*;

fn identity() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

fn secret() -> impl Strategy<Value = String> {
    "[ -~]{1,32}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: the right secret authenticates, a wrong one never does
    #[test]
    fn prop_chap_accepts_only_the_registered_secret(
        id in identity(),
        registered in secret(),
        presented in secret(),
    ) {
        let mut store = SecretStore::new();
        store.add(&id, &registered);
        let store = Arc::new(store);

        let (mut client_end, mut server_end) = MemoryChannel::pair();
        let server = thread::spawn(move || {
            ChapServer::new(store, Arc::new(NonceCache::default())).run(&mut server_end)
        });
        let client_ok = ChapClient::new(id, &presented, Arc::new(NonceCache::default()))
            .run(&mut client_end);
        let server_ok = server.join().unwrap();

        prop_assert_eq!(client_ok, registered == presented);
        prop_assert_eq!(server_ok, registered == presented);
    }

    /// Property: a challenge answered once is never answered again
    #[test]
    fn prop_replayed_challenge_is_refused(
        id in identity(),
        secret in secret(),
        challenge in prop::collection::vec(any::<u8>(), 32),
    ) {
        let cache = Arc::new(NonceCache::default());

        let mut first = ChapClient::new(id.clone(), &secret, Arc::clone(&cache));
        first.start();
        let answered = first.step(ChapChallenge { challenge: challenge.clone() }.into());
        prop_assert_eq!(answered.map(|m| m.message_type()), Some(MessageType::ChapResponse));

        let mut second = ChapClient::new(id, &secret, cache);
        second.start();
        let replayed = ChapChallenge { challenge }.into();
        prop_assert!(second.step(replayed).is_none());
        prop_assert!(second.is_finished() && !second.is_completed());
    }

    /// Property: the envelope opens only under the root key that sealed it
    #[test]
    fn prop_envelope_bound_to_root_key(
        root in any::<[u8; KEY_LEN]>(),
        other in any::<[u8; KEY_LEN]>(),
        key in any::<[u8; KEY_LEN]>(),
    ) {
        let session_key = SessionKey::from_array(key);
        let envelope = SessionKeyEnvelope::seal(&RootKey::from_array(root), &session_key).unwrap();

        prop_assert_eq!(envelope.decode(&RootKey::from_array(root)).unwrap(), session_key);
        if other != root {
            prop_assert!(envelope.decode(&RootKey::from_array(other)).is_err());
        }
    }

    /// Property: a hello nonce is accepted at most once per cache window
    #[test]
    fn prop_hello_nonce_single_use(nonce in prop::collection::vec(any::<u8>(), 32)) {
        let master = MasterKey::from_array([0x3c; KEY_LEN]);
        let ticket = Ticket::issue(
            &master,
            &SessionKey::generate(),
            "alice",
            "echo",
            std::time::Duration::from_secs(60),
        ).unwrap();
        let hello = Message::from(ClientHello { ticket, nonce });
        let cache = Arc::new(NonceCache::default());

        let mut first = ServiceServer::new("echo", master.clone(), Arc::clone(&cache));
        prop_assert!(first.step(hello.clone()).is_some());

        let mut second = ServiceServer::new("echo", master, cache);
        prop_assert!(second.step(hello).is_none());
        prop_assert!(!second.is_completed());
    }
}
