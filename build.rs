fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Envoy ext_authz v3. The client half is only used by tests.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/envoy/service/auth/v3/external_auth.proto"], &["proto"])?;

    // SPIFFE Workload API (JWT subset). The server half backs the fake agent in tests.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/spiffe/workload.proto"], &["proto"])?;

    Ok(())
}
