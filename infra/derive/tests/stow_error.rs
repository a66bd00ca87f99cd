#[test]
fn stow_error_ui() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/stow_error_pass.rs");
    t.pass("tests/ui/stow_error_codes_pass.rs");
    t.compile_fail("tests/ui/stow_error_no_context.rs");
    t.compile_fail("tests/ui/stow_error_tuple_variant.rs");
    t.compile_fail("tests/ui/stow_error_not_enum.rs");
    t.compile_fail("tests/ui/stow_error_duplicate_code.rs");
    t.compile_fail("tests/ui/stow_error_code_without_type.rs");
    t.compile_fail("tests/ui/stow_error_source_code_without_field.rs");
}
