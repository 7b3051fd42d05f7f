#[cfg(windows)]
fn main() {
    let mut res = winres::WindowsResource::new();
    res.set("ProductName", "LumaVeil Overlay");
    res.set("FileDescription", "LumaVeil Overlay - Color Correction Process");
    res.set("LegalCopyright", "© 2025 LumaVeil Contributors");
    res.set("CompanyName", "LumaVeil");
    res.set("OriginalFilename", "lumaveil-overlay.exe");

    if let Err(e) = res.compile() {
        eprintln!("Failed to compile Windows resource: {}", e);
    }
}

#[cfg(not(windows))]
fn main() {
    // No-op on non-Windows platforms
}
