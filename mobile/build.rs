fn main() {
    // Generate the Core ML protobuf bindings with the pure-Rust parser,
    // so no protoc install is needed.
    protobuf_codegen::Codegen::new()
        .pure()
        .includes(["src/protos"])
        .input("src/protos/coreml.proto")
        .cargo_out_dir("coreml-protos")
        .run_from_script();
}
