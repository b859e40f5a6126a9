use super::*;
use crate::config::ChainType;
use crate::ledger::TxType;
use aggsig::PartialSignature;
use keytree::Seed;

const HEIGHT: u64 = 20;

struct Party {
    keychain: Keychain,
    config: WalletConfig,
    state: WalletState,
}

impl Party {
    fn new(byte: u8) -> Self {
        Party {
            keychain: Keychain::from_seed(&Seed::from_bytes(&[byte; 32]).unwrap()),
            config: WalletConfig::new(ChainType::Usernet, "/tmp/unused", "pw"),
            state: WalletState::default(),
        }
    }

    fn negotiator(&self) -> SlateNegotiator<'_> {
        SlateNegotiator::new(&self.keychain, &self.config)
    }

    fn fund(&mut self, value: u64) -> Commitment {
        let index = self.state.next_unused_index().unwrap();
        let (commitment, _) = build_output(&self.keychain, index, value).unwrap();
        self.state.outputs.insert(OutputData {
            commitment,
            value,
            derivation_index: index,
            status: OutputStatus::Unspent,
            height: 1,
            lock_height: 0,
            tx_log_id: None,
            locked_by: None,
        });
        commitment
    }

    fn create(&mut self, args: &InitTxArgs) -> WalletResult<Slate> {
        let mut state = self.state.clone();
        let slate = self.negotiator().create(&mut state, args, HEIGHT)?;
        self.state = state;
        Ok(slate)
    }

    fn receive(&mut self, slate: &Slate, expected: Option<u64>) -> WalletResult<Slate> {
        let mut state = self.state.clone();
        let slate = self
            .negotiator()
            .receive(&mut state, slate, expected, None, Some(HEIGHT))?;
        self.state = state;
        Ok(slate)
    }

    fn finalize(&mut self, slate: &Slate) -> WalletResult<Slate> {
        let mut state = self.state.clone();
        let slate = self.negotiator().finalize(&mut state, slate)?;
        self.state = state;
        Ok(slate)
    }
}

fn base_fee() -> u64 {
    WalletConfig::default_base_fee()
}

#[test]
fn full_round_produces_valid_transaction() {
    let mut sender = Party::new(1);
    let mut receiver = Party::new(2);
    let input = sender.fund(100 * base_fee());

    let slate = sender.create(&InitTxArgs::new(10 * base_fee())).unwrap();
    assert_eq!(slate.status, SlateStatus::Created);
    assert_eq!(slate.fee, 8 * base_fee());
    assert_eq!(slate.participant_data.len(), 1);
    assert_eq!(
        sender.state.outputs.get(&input).unwrap().status,
        OutputStatus::Locked
    );

    let response = receiver.receive(&slate, Some(10 * base_fee())).unwrap();
    assert_eq!(response.status, SlateStatus::ReceiverSigned);
    assert_eq!(response.tx.body.outputs.len(), 2);

    let finalized = sender.finalize(&response).unwrap();
    assert_eq!(finalized.status, SlateStatus::Finalized);
    assert!(finalized.tx.validate().is_ok());
    let kernel = finalized.tx.kernel().unwrap();
    assert!(kernel.verify().is_ok());
    assert_eq!(kernel.fee, 8 * base_fee());

    let record = sender
        .state
        .ledger
        .find(&slate.id, Direction::Sent)
        .unwrap();
    assert!(record.finalized);
    assert!(record.stored_tx.is_some());
    assert_eq!(record.amount_debited, 100 * base_fee());
    assert_eq!(record.amount_credited, 82 * base_fee());
    assert!(sender.state.contexts.is_empty());

    let received = receiver
        .state
        .ledger
        .find(&slate.id, Direction::Received)
        .unwrap();
    assert_eq!(received.tx_type, TxType::Received);
    assert_eq!(received.amount, 10 * base_fee());
}

#[test]
fn messages_travel_signed() {
    let mut sender = Party::new(1);
    let mut receiver = Party::new(2);
    sender.fund(100 * base_fee());

    let mut args = InitTxArgs::new(base_fee());
    args.message = Some("for the coffee".into());
    let slate = sender.create(&args).unwrap();

    let mut state = receiver.state.clone();
    let response = receiver
        .negotiator()
        .receive(&mut state, &slate, None, Some("thanks".into()), None)
        .unwrap();
    receiver.state = state;
    sender.finalize(&response).unwrap();

    let record = sender
        .state
        .ledger
        .find(&slate.id, Direction::Sent)
        .unwrap();
    assert_eq!(record.messages, vec!["for the coffee", "thanks"]);

    let mut forged = slate.clone();
    forged.participant_data[0].message = Some("pay twice".into());
    assert!(matches!(
        Party::new(3).receive(&forged, None),
        Err(WalletError::MalformedSlate(_))
    ));
}

#[test]
fn receiver_checks_expected_amount() {
    let mut sender = Party::new(1);
    let mut receiver = Party::new(2);
    sender.fund(100 * base_fee());
    let slate = sender.create(&InitTxArgs::new(10 * base_fee())).unwrap();

    match receiver.receive(&slate, Some(9 * base_fee())) {
        Err(WalletError::AmountMismatch { expected, actual }) => {
            assert_eq!(expected, 9 * base_fee());
            assert_eq!(actual, 10 * base_fee());
        }
        other => panic!("unexpected {:?}", other),
    }
    // nothing was recorded
    assert!(receiver.state.ledger.list().is_empty());
    assert!(receiver.state.outputs.is_empty());
}

#[test]
fn malformed_rounds_are_rejected() {
    let mut sender = Party::new(1);
    let mut receiver = Party::new(2);
    sender.fund(100 * base_fee());
    let slate = sender.create(&InitTxArgs::new(10 * base_fee())).unwrap();

    // receive on a slate with no participants
    let mut empty = slate.clone();
    empty.participant_data.clear();
    assert!(matches!(
        receiver.receive(&empty, None),
        Err(WalletError::MalformedSlate(_))
    ));

    // finalize before the receiver signed
    assert!(matches!(
        sender.finalize(&slate),
        Err(WalletError::MalformedSlate(_))
    ));

    // fee below what the body needs
    let mut cheap = slate.clone();
    cheap.fee = base_fee();
    cheap.tx.kernel_mut().unwrap().fee = base_fee();
    assert!(matches!(
        receiver.receive(&cheap, None),
        Err(WalletError::MalformedSlate(_))
    ));

    // kernel and slate disagree on the lock height
    let mut relocked = slate.clone();
    relocked.lock_height = 7;
    assert!(matches!(
        receiver.receive(&relocked, None),
        Err(WalletError::MalformedSlate(_))
    ));

    // a slate claiming the sender already signed
    let mut presigned = slate.clone();
    presigned.status = SlateStatus::SenderSigned;
    assert!(matches!(
        receiver.receive(&presigned, None),
        Err(WalletError::MalformedSlate(_))
    ));

    // receiver reply altered in flight
    let response = receiver.receive(&slate, None).unwrap();
    let mut shifted = response.clone();
    shifted.amount += 1;
    assert!(matches!(
        sender.finalize(&shifted),
        Err(WalletError::AmountMismatch { .. })
    ));
}

#[test]
fn bad_receiver_share_fails_aggregation() {
    let mut sender = Party::new(1);
    let mut receiver = Party::new(2);
    sender.fund(100 * base_fee());
    let slate = sender.create(&InitTxArgs::new(10 * base_fee())).unwrap();
    let mut response = receiver.receive(&slate, None).unwrap();

    response.participant_data[1].part_sig = Some(PartialSignature(Scalar::one()));
    assert!(matches!(
        sender.finalize(&response),
        Err(WalletError::SignatureAggregationFailed(_))
    ));
    // the context survives a failed finalize
    assert!(sender.state.contexts.contains_key(&slate.id));
}

#[test]
fn unbalanced_body_is_rejected() {
    let mut sender = Party::new(1);
    let mut receiver = Party::new(2);
    sender.fund(100 * base_fee());
    let slate = sender.create(&InitTxArgs::new(10 * base_fee())).unwrap();
    let mut response = receiver.receive(&slate, None).unwrap();

    // receiver swaps in an output worth more than it was paid
    let (commit, proof) = build_output(&receiver.keychain, 99, 11 * base_fee()).unwrap();
    let last = response.tx.body.outputs.len() - 1;
    response.tx.body.outputs[last] = Output { commit, proof };
    assert!(matches!(
        sender.finalize(&response),
        Err(WalletError::MalformedSlate(_))
    ));
}

#[test]
fn resubmission_replays_or_fails() {
    let mut sender = Party::new(1);
    let mut receiver = Party::new(2);
    sender.fund(100 * base_fee());
    let slate = sender.create(&InitTxArgs::new(10 * base_fee())).unwrap();

    let first = receiver.receive(&slate, None).unwrap();
    let second = receiver.receive(&slate, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(receiver.state.outputs.len(), 1);
    assert_eq!(receiver.state.ledger.list().len(), 1);

    let mut changed = slate.clone();
    changed.amount += 1;
    assert!(matches!(
        receiver.receive(&changed, None),
        Err(WalletError::InvalidState(_))
    ));

    let finalized = sender.finalize(&first).unwrap();
    assert_eq!(sender.finalize(&first).unwrap(), finalized);

    let mut tampered = first.clone();
    tampered.participant_data[1].part_sig = Some(PartialSignature(Scalar::one()));
    assert!(matches!(
        sender.finalize(&tampered),
        Err(WalletError::InvalidState(_))
    ));
}

#[test]
fn cancelled_receipt_is_not_replayed() {
    let mut sender = Party::new(1);
    let mut receiver = Party::new(2);
    sender.fund(100 * base_fee());
    let slate = sender.create(&InitTxArgs::new(10 * base_fee())).unwrap();
    receiver.receive(&slate, None).unwrap();

    let id = receiver
        .state
        .ledger
        .find(&slate.id, Direction::Received)
        .unwrap()
        .id;
    receiver.state.cancel_tx(id).unwrap();
    assert!(receiver.state.outputs.is_empty());
    assert!(matches!(
        receiver.receive(&slate, None),
        Err(WalletError::InvalidState(_))
    ));
}

#[test]
fn finalize_after_cancel_fails() {
    let mut sender = Party::new(1);
    let mut receiver = Party::new(2);
    let input = sender.fund(100 * base_fee());
    let slate = sender.create(&InitTxArgs::new(10 * base_fee())).unwrap();
    let response = receiver.receive(&slate, None).unwrap();

    let id = sender
        .state
        .ledger
        .find(&slate.id, Direction::Sent)
        .unwrap()
        .id;
    sender.state.cancel_tx(id).unwrap();
    assert_eq!(
        sender.state.outputs.get(&input).unwrap().status,
        OutputStatus::Unspent
    );
    assert!(matches!(
        sender.finalize(&response),
        Err(WalletError::InvalidState(_))
    ));
}

#[test]
fn insufficient_funds_locks_nothing() {
    let mut sender = Party::new(1);
    let input = sender.fund(5 * base_fee());
    assert!(matches!(
        sender.create(&InitTxArgs::new(10 * base_fee())),
        Err(WalletError::InsufficientFunds { .. })
    ));
    assert_eq!(
        sender.state.outputs.get(&input).unwrap().status,
        OutputStatus::Unspent
    );
    assert!(sender.state.ledger.list().is_empty());
}

#[test]
fn version_two_round() {
    let mut sender = Party::new(1);
    let mut receiver = Party::new(2);
    sender.fund(100 * base_fee());
    let mut args = InitTxArgs::new(10 * base_fee());
    args.target_slate_version = Some(2);
    let slate = sender.create(&args).unwrap();
    assert_eq!(slate.version_info.version, 2);
    assert_eq!(slate.ttl_cutoff_height, None);

    let response = receiver.receive(&slate, None).unwrap();
    assert_eq!(response.version_info.version, 2);
    let finalized = sender.finalize(&response).unwrap();
    assert_eq!(finalized.version_info.version, 2);

    args.target_slate_version = Some(1);
    assert!(matches!(
        sender.create(&args),
        Err(WalletError::MalformedSlate(_))
    ));
}

#[test]
fn confirmation_drops_replay_copies() {
    let mut sender = Party::new(1);
    let mut receiver = Party::new(2);
    sender.fund(100 * base_fee());
    let slate = sender.create(&InitTxArgs::new(10 * base_fee())).unwrap();
    let response = receiver.receive(&slate, None).unwrap();
    sender.finalize(&response).unwrap();
    assert_eq!(receiver.state.received_slates.len(), 1);
    assert_eq!(sender.state.finalized_slates.len(), 1);

    let sent = sender.state.ledger.find(&slate.id, Direction::Sent).unwrap().id;
    let received = receiver
        .state
        .ledger
        .find(&slate.id, Direction::Received)
        .unwrap()
        .id;
    sender.state.confirm_record(Some(sent));
    receiver.state.confirm_record(Some(received));
    assert!(sender.state.finalized_slates.is_empty());
    assert!(receiver.state.received_slates.is_empty());

    // the ledger still refuses to credit or sign the slate twice
    assert!(matches!(
        receiver.receive(&slate, None),
        Err(WalletError::InvalidState(_))
    ));
    assert!(matches!(
        sender.finalize(&response),
        Err(WalletError::InvalidState(_))
    ));
    assert_eq!(receiver.state.outputs.len(), 1);
}

#[test]
fn ttl_bounds_the_round() {
    let mut sender = Party::new(1);
    let mut receiver = Party::new(2);
    sender.fund(100 * base_fee());
    let mut args = InitTxArgs::new(10 * base_fee());
    args.ttl_blocks = Some(5);
    let slate = sender.create(&args).unwrap();
    assert_eq!(slate.ttl_cutoff_height, Some(HEIGHT + 5));

    let mut state = receiver.state.clone();
    assert!(matches!(
        receiver
            .negotiator()
            .receive(&mut state, &slate, None, None, Some(HEIGHT + 6)),
        Err(WalletError::InvalidState(_))
    ));
    assert!(receiver
        .negotiator()
        .receive(&mut state, &slate, None, None, Some(HEIGHT + 5))
        .is_ok());

    // the sender gives up once the cutoff has passed
    assert!(sender.state.cancel_expired(HEIGHT + 5).unwrap().is_empty());
    assert_eq!(sender.state.cancel_expired(HEIGHT + 6).unwrap(), vec![slate.id]);
    let record = sender.state.ledger.find(&slate.id, Direction::Sent).unwrap();
    assert_eq!(record.tx_type, TxType::SentCancelled);
    assert_eq!(sender.state.outputs.balances(HEIGHT, 1, |_| false).locked, 0);

    // version 2 slates carry no TTL
    args.target_slate_version = Some(2);
    let v2 = sender.create(&args).unwrap();
    assert_eq!(v2.ttl_cutoff_height, None);
}
