//! Property tests for balance, attribution and window accounting.

use proptest::prelude::*;
use quarry_ledger::{has_access, Channel, Currency, LedgerConfig, LedgerRegistry};

#[derive(Clone, Debug)]
enum Op {
    Credit(u64),
    CreditVia(Channel, u64),
    Debit(u64),
    Adjust(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..10_000u64).prop_map(Op::Credit),
        (0..10_000u64).prop_map(|amount| Op::CreditVia(Channel::Primary, amount)),
        (0..10_000u64).prop_map(|amount| Op::CreditVia(Channel::Resale, amount)),
        (0..15_000u64).prop_map(Op::Debit),
        (-15_000..15_000i64).prop_map(Op::Adjust),
    ]
}

proptest! {
    #[test]
    fn balance_matches_model(ops in prop::collection::vec(op(), 1..200)) {
        let registry = LedgerRegistry::new(LedgerConfig::default());
        let ledger = registry.get_or_create(1);
        let mut model: i64 = 0;

        for op in &ops {
            match *op {
                Op::Credit(amount) => {
                    ledger.credit(Currency::Coins, amount);
                    model += i64::try_from(amount).unwrap();
                }
                Op::CreditVia(channel, amount) => {
                    ledger.credit_via(channel, Currency::Coins, amount);
                    model += i64::try_from(amount).unwrap();
                }
                Op::Debit(amount) => {
                    let amount_i = i64::try_from(amount).unwrap();
                    let accepted = ledger.debit(Currency::Coins, amount);
                    prop_assert_eq!(accepted, amount_i <= model);
                    if accepted {
                        model -= amount_i;
                    }
                }
                Op::Adjust(delta) => {
                    ledger.adjust(Currency::Coins, delta);
                    model = (model + delta).max(0);
                }
            }
            prop_assert!(model >= 0);
        }

        prop_assert_eq!(ledger.balance(Currency::Coins), u64::try_from(model).unwrap());
        prop_assert_eq!(ledger.window_currency(Currency::Coins), model);
        prop_assert!(ledger.audit().is_ok());
    }

    #[test]
    fn attribution_never_decreases(ops in prop::collection::vec(op(), 1..200)) {
        let registry = LedgerRegistry::new(LedgerConfig::default());
        let ledger = registry.get_or_create(1);
        let mut last = (0u64, 0u64);

        for op in &ops {
            match *op {
                Op::Credit(amount) => { ledger.credit(Currency::Tokens, amount); }
                Op::CreditVia(channel, amount) => { ledger.credit_via(channel, Currency::Tokens, amount); }
                Op::Debit(amount) => { ledger.debit(Currency::Tokens, amount); }
                Op::Adjust(delta) => { ledger.adjust(Currency::Tokens, delta); }
            }

            let now = (
                ledger.attributed(Channel::Primary, Currency::Tokens),
                ledger.attributed(Channel::Resale, Currency::Tokens),
            );
            prop_assert!(now.0 >= last.0 && now.1 >= last.1);
            prop_assert!(now.0 + now.1 <= ledger.lifetime_credited(Currency::Tokens));
            last = now;
        }
    }

    #[test]
    fn access_is_monotonic_in_rank(rank in proptest::char::range('a', 'z'), target in proptest::char::range('a', 'z')) {
        prop_assert_eq!(has_access(Some(rank), target), target <= rank);
        prop_assert_eq!(has_access(None, target), target == 'a');
    }
}
