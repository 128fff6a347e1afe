
use proc_macro::TokenStream;

/// Runs an async integration test once per RNG seed against a fresh `Bridge` harness.
///
/// The annotated function must take a single `Bridge` argument. Seeds are read from
/// `ORACLE_TEST_RNG_SEED` (one explicit seed) or `ORACLE_TEST_SAMPLES` (seeds `0..n`).
#[proc_macro_attribute]
pub fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    test::test_macro(args.into(), item.into()).into()
}
