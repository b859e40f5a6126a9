mod common;

use std::sync::Arc;
use std::thread;

use common::*;
use slatewallet::*;

#[test]
fn file_send_receive_finalize_post() {
    logging::init_logging();
    let chain = Arc::new(InMemoryChain::new());
    fund(&chain, PHRASE, &[50 * BASE_FEE, 30 * BASE_FEE]);
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = recovered(&chain, dir_a.path(), PHRASE);
    let b = fresh(&chain, dir_b.path());

    let slate = a.tx_create(&InitTxArgs::new(10 * BASE_FEE)).unwrap();
    let request = a.slate_file_path(&slate.id, false);
    transport::write_slate_file(&request, &slate).unwrap();
    assert!(request.ends_with(format!("{}.grinslate", slate.id)));

    // smallest first: the 30 output covers 10 + fee 8, change 12
    let (_, info) = a.info(false).unwrap();
    assert_eq!(info.amount_locked, 30 * BASE_FEE);
    assert_eq!(info.amount_awaiting_finalization, 12 * BASE_FEE);
    assert_eq!(info.amount_currently_spendable, 50 * BASE_FEE);

    let response = b.tx_receive(&request, Some("thanks".into())).unwrap();
    assert_eq!(response.status, SlateStatus::ReceiverSigned);
    let response_path = b.slate_file_path(&slate.id, true);
    assert!(response_path.exists());

    let finalized = a.tx_finalize(&response_path).unwrap();
    assert_eq!(finalized.status, SlateStatus::Finalized);
    assert!(finalized.tx.validate().is_ok());
    // finalizing the same response again is a no-op
    assert_eq!(a.tx_finalize(&response_path).unwrap(), finalized);

    a.tx_post(&slate.id).unwrap();
    assert_eq!(chain.kernels().unwrap().len(), 1);
    settle(&chain, &[&a, &b]);

    let sent = a.tx_get(&slate.id).unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].tx_type, TxType::SentConfirmed);
    assert_eq!(sent[0].fee, 8 * BASE_FEE);
    assert_eq!(sent[0].messages, vec!["thanks".to_string()]);
    let received = b.tx_get(&slate.id).unwrap();
    assert_eq!(received[0].tx_type, TxType::ReceivedConfirmed);

    let (refreshed, info) = a.info(true).unwrap();
    assert!(refreshed);
    assert_eq!(info.amount_currently_spendable, 62 * BASE_FEE);
    assert_eq!(info.amount_locked, 0);
    let (_, info) = b.info(true).unwrap();
    assert_eq!(info.amount_currently_spendable, 10 * BASE_FEE);

    assert!(matches!(
        a.tx_post(&slate.id),
        Err(WalletError::InvalidState(_))
    ));
    assert!(matches!(
        a.tx_cancel(sent[0].id),
        Err(WalletError::InvalidState(_))
    ));

    let spent: Vec<_> = a
        .outputs_get(None)
        .unwrap()
        .into_iter()
        .filter(|o| o.status == OutputStatus::Spent)
        .collect();
    assert_eq!(spent.len(), 1);
    assert_eq!(spent[0].value, 30 * BASE_FEE);
}

#[test]
fn cancel_before_receive() {
    let chain = Arc::new(InMemoryChain::new());
    let funded = fund(&chain, PHRASE, &[40 * BASE_FEE]);
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = recovered(&chain, dir_a.path(), PHRASE);
    let b = fresh(&chain, dir_b.path());

    let slate = a.tx_create(&InitTxArgs::new(10 * BASE_FEE)).unwrap();
    let record = a.tx_cancel_slate(&slate.id).unwrap();
    assert_eq!(record.tx_type, TxType::SentCancelled);

    // cancelling again changes nothing
    let again = a.tx_cancel(record.id).unwrap();
    assert_eq!(again.tx_type, TxType::SentCancelled);

    let outputs = a.outputs_get(None).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].commitment, funded[0]);
    assert_eq!(outputs[0].status, OutputStatus::Unspent);
    assert!(a.outputs_get(Some(record.id)).unwrap().is_empty());

    // receipt does not depend on the sender's cancellation
    let response = b.receive_slate(&slate, Some(10 * BASE_FEE), None).unwrap();
    assert_eq!(response.status, SlateStatus::ReceiverSigned);
    assert!(matches!(
        a.finalize_slate(&response),
        Err(WalletError::InvalidState(_))
    ));

    // the released input funds a new send
    let next = a.tx_create(&InitTxArgs::new(10 * BASE_FEE)).unwrap();
    assert_ne!(next.id, slate.id);
    assert_eq!(a.txs_get().unwrap().len(), 3);
}

#[test]
fn receiver_rejects_unexpected_amount() {
    let chain = Arc::new(InMemoryChain::new());
    fund(&chain, PHRASE, &[40 * BASE_FEE]);
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = recovered(&chain, dir_a.path(), PHRASE);
    let b = fresh(&chain, dir_b.path());

    let slate = a.tx_create(&InitTxArgs::new(10 * BASE_FEE)).unwrap();
    let err = b
        .receive_slate(&slate, Some(20 * BASE_FEE), None)
        .unwrap_err();
    assert_eq!(err.code(), "amount_mismatch");
    assert!(b.txs_get().unwrap().is_empty());
}

#[test]
fn send_over_loopback_transport() {
    let chain = Arc::new(InMemoryChain::new());
    fund(&chain, PHRASE, &[40 * BASE_FEE]);
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = recovered(&chain, dir_a.path(), PHRASE);
    let b = Arc::new(fresh(&chain, dir_b.path()));
    let transport = LoopbackTransport::new(b.clone());

    let mut args = InitTxArgs::new(5 * BASE_FEE);
    args.message = Some("rent".into());
    let finalized = a.tx_send(&args, "http://127.0.0.1:3415", &transport).unwrap();
    assert_eq!(finalized.status, SlateStatus::Finalized);

    let received = b.tx_get(&finalized.id).unwrap();
    assert_eq!(received[0].tx_type, TxType::Received);
    assert_eq!(received[0].messages, vec!["rent".to_string()]);

    a.tx_post(&finalized.id).unwrap();
    settle(&chain, &[&a, &b]);
    assert_eq!(b.info(false).unwrap().1.amount_currently_spendable, 5 * BASE_FEE);
}

struct Unreachable;

impl SlateTransport for Unreachable {
    fn send_tx_sync(&self, dest: &str, _slate: &Slate) -> WalletResult<Slate> {
        Err(WalletError::Transport(format!("{} is unreachable", dest)))
    }
}

#[test]
fn failed_delivery_cancels_the_send() {
    let chain = Arc::new(InMemoryChain::new());
    fund(&chain, PHRASE, &[40 * BASE_FEE]);
    let dir = tempfile::tempdir().unwrap();
    let a = recovered(&chain, dir.path(), PHRASE);

    let err = a
        .tx_send(&InitTxArgs::new(5 * BASE_FEE), "http://nowhere", &Unreachable)
        .unwrap_err();
    assert!(err.is_retryable());

    let records = a.txs_get().unwrap();
    let sent = records.last().unwrap();
    assert_eq!(sent.tx_type, TxType::SentCancelled);
    assert!(a
        .outputs_get(None)
        .unwrap()
        .iter()
        .all(|o| o.status == OutputStatus::Unspent));
}

#[test]
fn concurrent_sends_never_share_an_input() {
    let chain = Arc::new(InMemoryChain::new());
    fund(&chain, PHRASE, &[40 * BASE_FEE]);
    let dir = tempfile::tempdir().unwrap();
    let a = Arc::new(recovered(&chain, dir.path(), PHRASE));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let a = a.clone();
            thread::spawn(move || a.tx_create(&InitTxArgs::new(10 * BASE_FEE)))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(WalletError::InsufficientFunds { .. }))));
}

#[test]
fn post_rejected_by_node_marks_the_slate() {
    let chain = Arc::new(InMemoryChain::new());
    fund(&chain, PHRASE, &[40 * BASE_FEE]);
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = recovered(&chain, dir_a.path(), PHRASE);
    let b = fresh(&chain, dir_b.path());

    let slate = a.tx_create(&InitTxArgs::new(10 * BASE_FEE)).unwrap();
    assert!(matches!(
        a.tx_post(&slate.id),
        Err(WalletError::InvalidState(_))
    ));

    let response = b.receive_slate(&slate, None, None).unwrap();
    a.finalize_slate(&response).unwrap();
    chain.set_available(false).unwrap();
    let err = a.tx_post(&slate.id).unwrap_err();
    assert_eq!(err.code(), "chain_unavailable");
    assert_eq!(
        a.finalize_slate(&response).unwrap().status,
        SlateStatus::PostedFailed
    );
    assert!(!a.tx_get(&slate.id).unwrap()[0].posted);

    chain.set_available(true).unwrap();
    a.tx_post(&slate.id).unwrap();
    assert_eq!(
        a.finalize_slate(&response).unwrap().status,
        SlateStatus::Finalized
    );
    assert!(a.tx_get(&slate.id).unwrap()[0].posted);
}

#[test]
fn receiver_rejections_keep_their_kind_over_the_transport() {
    let chain = Arc::new(InMemoryChain::new());
    fund(&chain, PHRASE, &[40 * BASE_FEE, 40 * BASE_FEE]);
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = recovered(&chain, dir_a.path(), PHRASE);
    let b = Arc::new(fresh(&chain, dir_b.path()));
    let transport = LoopbackTransport::new(b.clone());
    let dest = "http://127.0.0.1:3415";

    let slate = a.tx_create(&InitTxArgs::new(5 * BASE_FEE)).unwrap();
    transport.send_tx_sync(dest, &slate).unwrap();

    let mut tampered = slate.clone();
    tampered.amount += 1;
    let err = transport.send_tx_sync(dest, &tampered).unwrap_err();
    assert!(matches!(err, WalletError::InvalidState(_)), "{:?}", err);
    assert!(!err.is_retryable());

    let other = a.tx_create(&InitTxArgs::new(5 * BASE_FEE)).unwrap();
    let mut relocked = other.clone();
    relocked.lock_height += 1;
    let err = transport.send_tx_sync(dest, &relocked).unwrap_err();
    assert!(matches!(err, WalletError::MalformedSlate(_)), "{:?}", err);
    assert!(!err.is_retryable());
}

#[test]
fn expired_send_is_cancelled_on_refresh() {
    let chain = Arc::new(InMemoryChain::new());
    fund(&chain, PHRASE, &[40 * BASE_FEE]);
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = recovered(&chain, dir_a.path(), PHRASE);
    let b = fresh(&chain, dir_b.path());

    let mut args = InitTxArgs::new(5 * BASE_FEE);
    args.ttl_blocks = Some(3);
    let slate = a.tx_create(&args).unwrap();
    assert!(slate.ttl_cutoff_height.is_some());

    chain.mine(4).unwrap();
    a.refresh().unwrap();
    assert_eq!(a.tx_get(&slate.id).unwrap()[0].tx_type, TxType::SentCancelled);
    assert!(a
        .outputs_get(None)
        .unwrap()
        .iter()
        .all(|o| o.status == OutputStatus::Unspent));

    assert!(matches!(
        b.receive_slate(&slate, None, None),
        Err(WalletError::InvalidState(_))
    ));
}
