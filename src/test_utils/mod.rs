//! Test utilities for oldloom
//!
//! Builders and doubles shared by unit tests and the integration suite:
//!
//! - [`ClassBuilder`] / [`CodeBuilder`] produce small but valid class files
//! - [`write_jar`] writes a jar from `(name, bytes)` pairs
//! - [`CountingTransport`] answers HTTP requests from canned responses and counts them
//! - [`init_test_logging`] installs a test-friendly tracing subscriber once
//!
//! # Example
//!
//! ```rust,no_run
//! use oldloom_cli::test_utils::{CannedResponse, CountingTransport};
//!
//! let transport = CountingTransport::new();
//! transport.route("https://example.invalid/a.json", CannedResponse::ok("{}"));
//! assert_eq!(transport.calls(), 0);
//! ```

use crate::classfile::code::{INVOKEINTERFACE, LDC, LDC_W};
use crate::classfile::descriptor::parameter_types;
use crate::classfile::{ACC_PUBLIC, Attribute, ClassFile, Constant, ConstantPool, Member};
use crate::config::{Settings, SettingsOverrides, WorkspaceConfig};
use crate::fetch::{HttpRequest, HttpResponse, HttpTransport};
use crate::host::{JsonRunConfigSink, StaticResolver};
use crate::jar::Jar;
use crate::provider::Environment;
use anyhow::Result;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::rc::Rc;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. With `None` the `RUST_LOG` variable decides, and
/// nothing is installed when it is unset.
///
/// ```bash
/// RUST_LOG=oldloom_cli=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// Builds a class file with the given members
///
/// Methods added without code are abstract-looking stubs (no `Code` attribute). The result
/// is produced through [`ClassFile::to_bytes`], so parsing and re-serializing it yields the
/// same bytes.
pub struct ClassBuilder {
    pool: ConstantPool,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Member>,
    methods: Vec<Member>,
    attributes: Vec<Attribute>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        let mut pool = ConstantPool::new();
        let this_class = pool.intern_class(name).expect("intern class");
        let super_class = pool.intern_class("java/lang/Object").expect("intern super");
        Self {
            pool,
            access: ACC_PUBLIC | 0x0020,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub const fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    #[must_use]
    pub fn super_class(mut self, name: &str) -> Self {
        self.super_class = self.pool.intern_class(name).expect("intern super");
        self
    }

    #[must_use]
    pub fn interface(mut self, name: &str) -> Self {
        let index = self.pool.intern_class(name).expect("intern interface");
        self.interfaces.push(index);
        self
    }

    #[must_use]
    pub fn field(self, name: &str, descriptor: &str) -> Self {
        self.field_with_access(ACC_PUBLIC, name, descriptor)
    }

    #[must_use]
    pub fn field_with_access(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        let member = self.member(access, name, descriptor);
        self.fields.push(member);
        self
    }

    #[must_use]
    pub fn method(self, name: &str, descriptor: &str) -> Self {
        self.method_with_access(ACC_PUBLIC, name, descriptor)
    }

    #[must_use]
    pub fn method_with_access(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        let member = self.member(access, name, descriptor);
        self.methods.push(member);
        self
    }

    /// A public method whose body is written by `body`.
    #[must_use]
    pub fn method_with_code(self, name: &str, descriptor: &str, body: impl FnOnce(&mut CodeBuilder<'_>)) -> Self {
        self.method_with_access_and_code(ACC_PUBLIC, name, descriptor, body)
    }

    #[must_use]
    pub fn method_with_access_and_code(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        body: impl FnOnce(&mut CodeBuilder<'_>),
    ) -> Self {
        let mut member = self.member(access, name, descriptor);
        let code_name = self.pool.intern_utf8("Code").expect("intern Code");
        let mut builder = CodeBuilder {
            pool: &mut self.pool,
            code: Vec::new(),
        };
        body(&mut builder);
        let code = builder.code;

        let mut data = Vec::new();
        data.extend_from_slice(&8u16.to_be_bytes());
        data.extend_from_slice(&8u16.to_be_bytes());
        data.extend_from_slice(&(code.len() as u32).to_be_bytes());
        data.extend_from_slice(&code);
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        member.attributes.push(Attribute {
            name_index: code_name,
            data,
        });
        self.methods.push(member);
        self
    }

    /// A class-level attribute with a raw payload.
    #[must_use]
    pub fn attribute(mut self, name: &str, data: Vec<u8>) -> Self {
        let name_index = self.pool.intern_utf8(name).expect("intern attribute name");
        self.attributes.push(Attribute { name_index, data });
        self
    }

    /// A class-level `SourceFile` attribute.
    #[must_use]
    pub fn source_file(mut self, file: &str) -> Self {
        let value = self.pool.intern_utf8(file).expect("intern source file");
        self.attribute("SourceFile", value.to_be_bytes().to_vec())
    }

    pub fn build(self) -> Vec<u8> {
        ClassFile {
            minor_version: 0,
            major_version: 50,
            pool: self.pool,
            access: self.access,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: self.interfaces,
            fields: self.fields,
            methods: self.methods,
            attributes: self.attributes,
        }
        .to_bytes()
        .expect("serialize test class")
    }

    fn member(&mut self, access: u16, name: &str, descriptor: &str) -> Member {
        Member {
            access,
            name_index: self.pool.intern_utf8(name).expect("intern member name"),
            descriptor_index: self.pool.intern_utf8(descriptor).expect("intern descriptor"),
            attributes: Vec::new(),
        }
    }
}

/// Appends instructions to a method body being built by [`ClassBuilder`].
pub struct CodeBuilder<'a> {
    pool: &'a mut ConstantPool,
    code: Vec<u8>,
}

impl CodeBuilder<'_> {
    /// A single-byte instruction.
    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.code.push(opcode);
        self
    }

    /// `invokevirtual`, `invokespecial`, `invokestatic` or `invokeinterface`.
    pub fn invoke(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let class = self.pool.intern_class(owner).expect("intern owner");
        let name_and_type = self.pool.intern_name_and_type(name, descriptor).expect("intern nat");
        let constant = if opcode == INVOKEINTERFACE {
            Constant::InterfaceMethodref { class, name_and_type }
        } else {
            Constant::Methodref { class, name_and_type }
        };
        let index = self.pool.intern(constant).expect("intern methodref");
        self.code.push(opcode);
        self.code.extend_from_slice(&index.to_be_bytes());
        if opcode == INVOKEINTERFACE {
            let slots: usize = parameter_types(descriptor)
                .expect("valid descriptor")
                .iter()
                .map(|t| if *t == "J" || *t == "D" { 2 } else { 1 })
                .sum();
            self.code.push((slots + 1) as u8);
            self.code.push(0);
        }
        self
    }

    /// `getfield`-style instruction (`0xb2..=0xb5`) on a field reference.
    pub fn field_access(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let class = self.pool.intern_class(owner).expect("intern owner");
        let name_and_type = self.pool.intern_name_and_type(name, descriptor).expect("intern nat");
        let index = self
            .pool
            .intern(Constant::Fieldref { class, name_and_type })
            .expect("intern fieldref");
        self.code.push(opcode);
        self.code.extend_from_slice(&index.to_be_bytes());
        self
    }

    /// Load a string constant with `ldc`, or `ldc_w` once the pool is past 255 entries.
    pub fn ldc_string(&mut self, value: &str) -> &mut Self {
        let utf8 = self.pool.intern_utf8(value).expect("intern string");
        let index = self.pool.intern(Constant::String(utf8)).expect("intern string constant");
        if let Ok(short) = u8::try_from(index) {
            self.code.push(LDC);
            self.code.push(short);
        } else {
            self.code.push(LDC_W);
            self.code.extend_from_slice(&index.to_be_bytes());
        }
        self
    }
}

/// Write a jar containing `entries` to `path`.
pub fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) -> Result<()> {
    let jar: Jar = entries.iter().map(|(name, data)| ((*name).to_string(), data.clone())).collect();
    jar.write(path)
}

/// A response served by [`CountingTransport`].
#[derive(Debug, Clone)]
pub struct CannedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl CannedResponse {
    /// `200 OK` with `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// An empty response with `status`.
    pub const fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Default)]
struct TransportState {
    routes: HashMap<String, CannedResponse>,
    requests: Vec<HttpRequest>,
}

/// In-memory [`HttpTransport`] that records every request
///
/// Clones share state, so a test can hand one clone to a `Fetcher` and inspect the other.
/// Unrouted URLs answer `404`.
#[derive(Clone, Default)]
pub struct CountingTransport {
    state: Rc<RefCell<TransportState>>,
}

impl CountingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for `url`, replacing any earlier route.
    pub fn route(&self, url: &str, response: CannedResponse) {
        self.state.borrow_mut().routes.insert(url.to_string(), response);
    }

    pub fn calls(&self) -> usize {
        self.state.borrow().requests.len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.borrow().requests.clone()
    }
}

impl HttpTransport for CountingTransport {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut state = self.state.borrow_mut();
        state.requests.push(request.clone());
        let canned = state
            .routes
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| CannedResponse::status(404));
        let mut response = HttpResponse::new(canned.status, Cursor::new(canned.body));
        for (name, value) in &canned.headers {
            response = response.with_header(name, value.as_str());
        }
        Ok(response)
    }
}

/// Build an [`Environment`] for `project_dir` from project-file text
///
/// `extra` is appended after `minecraft_version = "1.4.7"`, so it may override nothing but
/// can add any other key or table. The shared cache lives in `{project_dir}/global-cache`.
pub fn test_environment(
    project_dir: &Path,
    extra: &str,
    transport: CountingTransport,
) -> Result<Environment> {
    test_environment_for("1.4.7", project_dir, extra, transport)
}

/// [`test_environment`] for a specific game version.
pub fn test_environment_for(
    version: &str,
    project_dir: &Path,
    extra: &str,
    transport: CountingTransport,
) -> Result<Environment> {
    let config = WorkspaceConfig::parse(&format!("minecraft_version = \"{version}\"\n{extra}\n"))?;
    let settings = Settings::resolve(
        &config,
        project_dir,
        Some(project_dir.join("global-cache")),
        SettingsOverrides::default(),
    )?;
    let resolver = StaticResolver::from_config(&config, project_dir);
    let sink = JsonRunConfigSink::new(settings.run_config_dir());
    Ok(Environment::new(settings, Box::new(transport), Box::new(resolver), Box::new(sink)))
}
