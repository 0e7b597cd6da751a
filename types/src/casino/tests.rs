use super::*;
use proptest::prelude::*;
use rand::{rngs::StdRng, SeedableRng};

fn amount(value: &str) -> Amount {
    value.parse().expect("valid amount")
}

#[test]
fn test_amount_parse_and_display() {
    assert_eq!(amount("1.5").units(), 1_500_000_000);
    assert_eq!(amount(".5").units(), 500_000_000);
    assert_eq!(amount("+7").units(), 7 * UNITS_PER_WHOLE);
    assert_eq!(amount("-2.25").to_string(), "-2.25");
    assert_eq!(amount("2.000").to_string(), "2");
    assert_eq!(amount("0.000000001").to_string(), "0.000000001");
}

#[test]
fn test_amount_parse_rejects_garbage() {
    assert_eq!("".parse::<Amount>(), Err(AmountError::Empty));
    assert!(matches!("abc".parse::<Amount>(), Err(AmountError::Invalid(_))));
    assert!(matches!("1.2.3".parse::<Amount>(), Err(AmountError::Invalid(_))));
    assert!(matches!(".".parse::<Amount>(), Err(AmountError::Invalid(_))));
    assert!(matches!(
        "0.0000000001".parse::<Amount>(),
        Err(AmountError::TooPrecise { max: 9, .. })
    ));
    assert!(matches!(
        "99999999999999".parse::<Amount>(),
        Err(AmountError::OutOfRange(_))
    ));
}

#[test]
fn test_amount_json_accepts_strings_and_numbers() {
    let from_str: Amount = serde_json::from_str("\"1.2\"").unwrap();
    let from_int: Amount = serde_json::from_str("3").unwrap();
    let from_float: Amount = serde_json::from_str("0.4").unwrap();
    assert_eq!(from_str, amount("1.2"));
    assert_eq!(from_int, Amount::from_whole(3));
    assert_eq!(from_float, amount("0.4"));
    assert_eq!(serde_json::to_string(&amount("1.2")).unwrap(), "\"1.2\"");
    assert!(serde_json::from_str::<Amount>("\"ten\"").is_err());
}

#[test]
fn test_amount_arithmetic() {
    let total: Amount = [amount("1.1"), amount("2.2"), amount("-0.3")]
        .into_iter()
        .sum();
    assert_eq!(total, Amount::from_whole(3));
    assert_eq!(amount("10").mul_ratio(4, 10), Amount::from_whole(4));
    assert_eq!(amount("120").whole_multiples_of(REFERRAL_CHUNK), 2);
    assert_eq!(amount("49.999").whole_multiples_of(REFERRAL_CHUNK), 0);
    assert_eq!(amount("120").whole_multiples_of(Amount::ZERO), 0);
}

#[test]
fn test_amount_checked_arithmetic() {
    let big = Amount::from_whole(5_000_000_000);
    assert_eq!(big.checked_add(big), None);
    assert_eq!(
        big.checked_add(Amount::from_whole(1)),
        Some(Amount::from_whole(5_000_000_001))
    );
    assert_eq!((-big).checked_sub(big), None);
    assert_eq!(
        Amount::ZERO.checked_sub(amount("0.5")),
        Some(amount("-0.5"))
    );
    assert_eq!(
        Amount::from_units(i64::MAX).mul_ratio(2, 1),
        Amount::from_units(i64::MAX)
    );
    assert_eq!(
        Amount::from_units(i64::MIN).mul_ratio(2, 1),
        Amount::from_units(i64::MIN)
    );
}

#[test]
fn test_first_deposit_bonus_caps_at_two() {
    let bonus = Bonus::for_first_deposit(Amount::from_whole(10));
    assert_eq!(bonus.bonus_balance, Amount::from_whole(2));
    assert_eq!(bonus.required_rollover, Amount::from_whole(120));
    assert_eq!(bonus.total_rolled, Amount::ZERO);
    assert!(!bonus.is_converted);
}

#[test]
fn test_first_deposit_bonus_below_cap() {
    let bonus = Bonus::for_first_deposit(Amount::from_whole(3));
    assert_eq!(bonus.bonus_balance, amount("1.2"));
    assert_eq!(bonus.required_rollover, Amount::from_whole(72));
}

#[test]
fn test_bonus_grant_guard() {
    assert!(!Bonus::default().blocks_new_grant());
    assert_eq!(Bonus::default().state(), BonusState::None);

    let active = Bonus::for_first_deposit(Amount::from_whole(5));
    assert!(active.blocks_new_grant());
    assert_eq!(active.state(), BonusState::Active);

    let drained = Bonus {
        bonus_balance: amount("-3"),
        total_rolled: amount("5"),
        ..active
    };
    assert!(!drained.blocks_new_grant());

    let converted = Bonus {
        bonus_balance: Amount::ZERO,
        is_converted: true,
        ..active
    };
    assert!(converted.blocks_new_grant());
    assert_eq!(converted.state(), BonusState::Converted);
}

#[test]
fn test_bonus_rollover_progress() {
    let mut bonus = Bonus::for_first_deposit(Amount::from_whole(10));
    assert!(!bonus.rollover_met());
    assert_eq!(bonus.remaining_rollover(), Amount::from_whole(120));

    bonus.total_rolled = Amount::from_whole(150);
    assert!(bonus.rollover_met());
    assert_eq!(bonus.remaining_rollover(), Amount::ZERO);
    assert_eq!(RolloverOutcome::NoBonus.bonus(), Bonus::default());
}

#[test]
fn test_referral_tier_threshold() {
    assert_eq!(ReferralTier::for_count(0), ReferralTier::One);
    assert_eq!(ReferralTier::for_count(9), ReferralTier::One);
    assert_eq!(ReferralTier::for_count(10), ReferralTier::Two);
    assert_eq!(ReferralTier::Two.chunk_reward(), amount("5.5"));
}

#[test]
fn test_referral_commission_examples() {
    let tier = ReferralTier::for_count(3);
    assert_eq!(referral_commission(amount("120"), tier), Amount::from_whole(10));

    let tier = ReferralTier::for_count(10);
    assert_eq!(referral_commission(amount("200"), tier), Amount::from_whole(22));

    assert_eq!(
        referral_commission(amount("40"), ReferralTier::One),
        Amount::ZERO
    );
}

#[test]
fn test_referral_tier_serializes_as_level() {
    assert_eq!(serde_json::to_string(&ReferralTier::Two).unwrap(), "2");
    let tier: ReferralTier = serde_json::from_str("1").unwrap();
    assert_eq!(tier, ReferralTier::One);
    assert!(serde_json::from_str::<ReferralTier>("3").is_err());
    assert_eq!(ReferralTier::try_from(0), Err(InvalidTier(0)));
}

#[test]
fn test_referral_outcome_json_shape() {
    let applied = ReferralOutcome::Applied {
        referrer_id: 7,
        earnings: Amount::from_whole(10),
        tier: ReferralTier::One,
    };
    let value = serde_json::to_value(applied).unwrap();
    assert_eq!(value["outcome"], "applied");
    assert_eq!(value["earnings"], "10");
    assert_eq!(value["tier"], 1);

    let ignored = ReferralOutcome::Ignored {
        reason: IgnoredReason::UnknownCode,
    };
    let value = serde_json::to_value(ignored).unwrap();
    assert_eq!(value["outcome"], "ignored");
    assert_eq!(value["reason"], "unknown_code");
    assert_eq!(ignored.earnings(), Amount::ZERO);
}

#[test]
fn test_generated_referral_codes_are_valid() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..64 {
        let code = generate_referral_code(&mut rng);
        assert_eq!(code.len(), REFERRAL_CODE_LENGTH);
        assert!(is_valid_referral_code(&code), "bad code {code}");
    }
    assert!(!is_valid_referral_code("abcdefgh"));
    assert!(!is_valid_referral_code("ABC"));
}

#[test]
fn test_withdrawal_classification_boundaries() {
    let initial = Amount::from_whole(5);
    let balance = Amount::from_whole(100);

    assert_eq!(
        classify_withdrawal(initial, balance, initial),
        Ok(WithdrawalClass::Instant)
    );
    assert_eq!(
        classify_withdrawal(amount("5.01"), balance, initial),
        Ok(WithdrawalClass::Review)
    );
    assert_eq!(
        classify_withdrawal(amount("100.5"), balance, initial),
        Err(InsufficientBalance {
            requested: amount("100.5"),
            available: balance,
        })
    );
}

#[test]
fn test_withdrawal_without_deposits_always_reviewed() {
    assert_eq!(
        classify_withdrawal(amount("0.1"), Amount::from_whole(1), Amount::ZERO),
        Ok(WithdrawalClass::Review)
    );
}

#[test]
fn test_withdrawal_status_strings() {
    for status in [
        WithdrawalStatus::Pending,
        WithdrawalStatus::Approved,
        WithdrawalStatus::Rejected,
    ] {
        assert_eq!(status.as_str().parse::<WithdrawalStatus>(), Ok(status));
    }
    assert!("cancelled".parse::<WithdrawalStatus>().is_err());
    assert!(!WithdrawalStatus::Pending.is_resolved());
    assert!(WithdrawalStatus::Rejected.is_resolved());
}

#[test]
fn test_withdrawal_decision_json_shape() {
    let decision = WithdrawalDecision::Instant {
        amount: Amount::from_whole(1),
        address: "addr".to_string(),
    };
    let value = serde_json::to_value(&decision).unwrap();
    assert_eq!(value["decision"], "instant");
    assert_eq!(value["amount"], "1");
}

#[test]
fn test_user_secret_is_never_serialized() {
    let user = User {
        user_id: 1,
        address: Some("addr".to_string()),
        encrypted_secret: Some("ciphertext".to_string()),
        locale: None,
        verified: false,
        created_at_ms: 0,
    };
    assert!(user.has_wallet());
    assert_eq!(user.locale_or_default(), DEFAULT_LOCALE);
    let json = serde_json::to_string(&user).unwrap();
    assert!(!json.contains("ciphertext"));
}

#[test]
fn test_locale_validation() {
    assert!(validate_locale("en").is_ok());
    assert!(validate_locale("es").is_ok());
    assert_eq!(
        validate_locale("fr"),
        Err(AccountInvariantError::UnsupportedLocale("fr".to_string()))
    );
}

fn arb_deposit() -> impl Strategy<Value = Amount> {
    (0i64..1_000_000 * UNITS_PER_WHOLE).prop_map(Amount::from_units)
}

proptest! {
    #[test]
    fn prop_bonus_is_capped_and_requires_sixty_x(deposit in arb_deposit()) {
        let bonus = Bonus::for_first_deposit(deposit);
        prop_assert!(bonus.bonus_balance <= MAX_FIRST_DEPOSIT_BONUS);
        prop_assert!(bonus.bonus_balance <= deposit.mul_ratio(4, 10));
        prop_assert_eq!(bonus.required_rollover, bonus.bonus_balance.times(60));
    }

    #[test]
    fn prop_commission_never_exceeds_tier_rate(deposit in arb_deposit(), count in 0u32..50) {
        let tier = ReferralTier::for_count(count);
        let earnings = referral_commission(deposit, tier);
        let chunks = deposit.whole_multiples_of(REFERRAL_CHUNK);
        prop_assert_eq!(earnings, tier.chunk_reward().times(chunks));
        prop_assert!(earnings <= deposit.mul_ratio(11, 100));
    }

    #[test]
    fn prop_amount_display_parses_back(units in any::<i64>()) {
        let value = Amount::from_units(units);
        prop_assert_eq!(value.to_string().parse::<Amount>(), Ok(value));
    }
}
