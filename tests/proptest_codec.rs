use labelfuse::data::io_csv::{from_csv_str, to_csv_string};
use labelfuse::data::io_protobin::{from_protobin_slice, to_protobin_bytes};
use labelfuse::data::{ErrorRate, ObservedInstance, PredictedInstance};
use proptest::prelude::*;

mod proptest_helpers;

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn protobin_roundtrip_is_exact(records in proptest_helpers::arb_predicted(30)) {
        let bytes = to_protobin_bytes(&records);
        let restored: Vec<PredictedInstance> = from_protobin_slice(&bytes).expect("decode protobin");
        prop_assert_eq!(restored, records);
    }

    #[test]
    fn protobin_encoding_is_deterministic(records in proptest_helpers::arb_error_rates(30)) {
        prop_assert_eq!(to_protobin_bytes(&records), to_protobin_bytes(&records));
        let restored: Vec<ErrorRate> = from_protobin_slice(&to_protobin_bytes(&records))
            .expect("decode protobin");
        prop_assert_eq!(restored, records);
    }

    #[test]
    fn csv_roundtrip_preserves_predictions(records in proptest_helpers::arb_predicted(30)) {
        let csv = to_csv_string(&records).expect("serialize csv");
        let restored: Vec<PredictedInstance> = from_csv_str(&csv).expect("parse csv");
        let res = proptest_helpers::assert_predicted_close(&records, &restored, proptest_helpers::EPS_CSV);
        prop_assert!(res.is_ok(), "{}", res.unwrap_err());
    }

    #[test]
    fn csv_roundtrip_preserves_observations(records in proptest_helpers::arb_observed(30)) {
        let csv = to_csv_string(&records).expect("serialize csv");
        let restored: Vec<ObservedInstance> = from_csv_str(&csv).expect("parse csv");
        prop_assert_eq!(restored, records);
    }

    #[test]
    fn protobin_and_csv_agree(records in proptest_helpers::arb_observed(20)) {
        let via_protobin: Vec<ObservedInstance> =
            from_protobin_slice(&to_protobin_bytes(&records)).expect("decode protobin");
        let via_csv: Vec<ObservedInstance> =
            from_csv_str(&to_csv_string(&records).expect("serialize csv")).expect("parse csv");
        prop_assert_eq!(via_protobin, via_csv);
    }
}
