// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
use std::io::Result;

fn main() -> Result<()> {
    if std::env::var_os("PROTOC").is_none() {
        unsafe {
            std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().unwrap());
        }
    }

    // Compile scan protocol (request API exposed by the control plane)
    prost_build::compile_protos(&["proto/scan.proto"], &["proto/"])?;

    // Compile storage protocol (blob service client surface)
    prost_build::compile_protos(&["proto/storage.proto"], &["proto/"])?;

    Ok(())
}
