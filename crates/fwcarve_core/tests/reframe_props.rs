use fwcarve_core::{
    head_size, marker_offsets, read_marker, reframe, split_rebuilt, MARKER,
};
use proptest::prelude::*;

fn no_marker(bytes: &[u8]) -> bool {
    !bytes.windows(MARKER.len()).any(|w| w == MARKER)
}

proptest! {
    #[test]
    fn rebuilt_image_has_one_marker_with_exact_length(
        original in prop::collection::vec(any::<u8>(), 1..4096),
        payload in prop::collection::vec(any::<u8>(), 1..2048),
    ) {
        prop_assume!(no_marker(&original) && no_marker(&payload));
        let image = reframe(&original, &payload).unwrap();

        let offsets = marker_offsets(&image);
        prop_assert_eq!(offsets.len(), 1);
        let at = offsets[0];
        prop_assert_eq!(at, head_size(original.len()));

        let mut raw = [0u8; 8];
        raw.copy_from_slice(&image[at + 10..at + 18]);
        prop_assert_eq!(u64::from_le_bytes(raw), payload.len() as u64);
        prop_assert_eq!(&image[at + 18..at + 18 + payload.len()], &payload[..]);

        let marker = read_marker(&image).unwrap();
        prop_assert_eq!(marker.offset, at);
    }

    #[test]
    fn head_and_tail_reproduce_original(
        original in prop::collection::vec(any::<u8>(), 1..4096),
        payload in prop::collection::vec(any::<u8>(), 1..512),
    ) {
        prop_assume!(no_marker(&original) && no_marker(&payload));
        let image = reframe(&original, &payload).unwrap();
        let parts = split_rebuilt(&image).unwrap();

        prop_assert_eq!(parts.payload, &payload[..]);
        prop_assert_eq!(parts.original(), original);
    }
}
