//! The C# node-kind catalog, expressed as data.
//!
//! Every concrete syntax construct is a [`NodeKind`]; its single/multiple
//! edges are [`EdgeKind`]s and its scalar fields are [`AttrKind`]s. Edges and
//! attributes declared on an abstract kind are inherited by every descendant
//! and keep the same slot index there, so a node's slot vectors are always
//! "base slots first, own slots last".
//!
//! The inheritance relation is precomputed once into one `u64` ancestor
//! bitset per kind (see [`Schema`]), so `is_descendant` is a mask test.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::NodeId;
use crate::node::{AttrType, Node};

/// Whether an edge holds one target or an ordered list of targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Multiplicity {
    Single,
    Multiple,
}

/// Whether setting an edge makes the target a child of the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ownership {
    /// Containment: the target's `parent` is the edge owner.
    Owning,
    /// Semantic link (e.g. "this call resolves to that method").
    Reference,
}

/// Static description of a node kind.
#[derive(Debug, Clone, Copy)]
pub struct KindSpec {
    pub kind: NodeKind,
    pub name: &'static str,
    /// Direct base kind; `NodeKind::None` for the hierarchy root.
    pub base: NodeKind,
    pub is_abstract: bool,
}

/// Static description of an edge declared on some kind.
#[derive(Debug, Clone, Copy)]
pub struct EdgeSpec {
    pub kind: EdgeKind,
    /// Kind that declares the edge. Descendants inherit it.
    pub owner: NodeKind,
    pub name: &'static str,
    /// Expected base kind of every target.
    pub target: NodeKind,
    pub multiplicity: Multiplicity,
    pub ownership: Ownership,
    /// Type of the per-entry associated value, for associated lists.
    pub assoc: Option<AttrType>,
}

impl EdgeSpec {
    pub fn is_multiple(&self) -> bool {
        self.multiplicity == Multiplicity::Multiple
    }

    pub fn is_owning(&self) -> bool {
        self.ownership == Ownership::Owning
    }
}

/// Static description of a scalar attribute declared on some kind.
#[derive(Debug, Clone, Copy)]
pub struct AttrSpec {
    pub kind: AttrKind,
    pub owner: NodeKind,
    pub name: &'static str,
    pub ty: AttrType,
}

macro_rules! node_kinds {
    ($( $variant:ident = $tag:literal, base: $base:ident, is_abstract: $abs:literal; )*) => {
        /// Tag identifying which schema type a node instantiates.
        ///
        /// Tag `0` (`None`) never denotes a real node.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(u16)]
        pub enum NodeKind {
            $( $variant = $tag, )*
        }

        impl NodeKind {
            /// Every kind, in tag order.
            pub const ALL: &'static [NodeKind] = &[ $( NodeKind::$variant, )* ];

            /// Decodes a stored tag.
            pub fn from_tag(tag: u16) -> Option<NodeKind> {
                match tag {
                    $( $tag => Some(NodeKind::$variant), )*
                    _ => None,
                }
            }
        }

        static KIND_SPECS: &[KindSpec] = &[
            $( KindSpec {
                kind: NodeKind::$variant,
                name: stringify!($variant),
                base: NodeKind::$base,
                is_abstract: $abs,
            }, )*
        ];
    };
}

macro_rules! edge_kinds {
    ($( $variant:ident: $owner:ident . $name:literal => $target:ident, $card:ident, $own:ident $(, assoc $assoc:ident)?; )*) => {
        /// Identifies one schema-declared edge (owner kind + edge name).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(u16)]
        pub enum EdgeKind {
            $( $variant, )*
        }

        impl EdgeKind {
            /// Every edge kind, in tag order.
            pub const ALL: &'static [EdgeKind] = &[ $( EdgeKind::$variant, )* ];
        }

        static EDGE_SPECS: &[EdgeSpec] = &[
            $( EdgeSpec {
                kind: EdgeKind::$variant,
                owner: NodeKind::$owner,
                name: $name,
                target: NodeKind::$target,
                multiplicity: Multiplicity::$card,
                ownership: Ownership::$own,
                assoc: edge_kinds!(@assoc $($assoc)?),
            }, )*
        ];
    };
    (@assoc) => { None };
    (@assoc $assoc:ident) => { Some(AttrType::$assoc) };
}

macro_rules! attr_kinds {
    ($( $variant:ident: $owner:ident . $name:literal => $ty:ident; )*) => {
        /// Identifies one schema-declared scalar attribute.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(u16)]
        pub enum AttrKind {
            $( $variant, )*
        }

        impl AttrKind {
            /// Every attribute kind, in tag order.
            pub const ALL: &'static [AttrKind] = &[ $( AttrKind::$variant, )* ];
        }

        static ATTR_SPECS: &[AttrSpec] = &[
            $( AttrSpec {
                kind: AttrKind::$variant,
                owner: NodeKind::$owner,
                name: $name,
                ty: AttrType::$ty,
            }, )*
        ];
    };
}

node_kinds! {
    None = 0, base: None, is_abstract: true;
    Base = 1, base: None, is_abstract: true;
    Positioned = 2, base: Base, is_abstract: true;
    Expression = 3, base: Positioned, is_abstract: true;
    TypeSyntax = 4, base: Expression, is_abstract: true;
    Name = 5, base: TypeSyntax, is_abstract: true;
    Statement = 6, base: Positioned, is_abstract: true;
    MemberDeclaration = 7, base: Positioned, is_abstract: true;
    BaseTypeDeclaration = 8, base: MemberDeclaration, is_abstract: true;
    TypeDeclaration = 9, base: BaseTypeDeclaration, is_abstract: true;
    CompilationUnit = 10, base: Positioned, is_abstract: false;
    UsingDirective = 11, base: Positioned, is_abstract: false;
    NamespaceDeclaration = 12, base: MemberDeclaration, is_abstract: false;
    ClassDeclaration = 13, base: TypeDeclaration, is_abstract: false;
    StructDeclaration = 14, base: TypeDeclaration, is_abstract: false;
    InterfaceDeclaration = 15, base: TypeDeclaration, is_abstract: false;
    EnumDeclaration = 16, base: BaseTypeDeclaration, is_abstract: false;
    EnumMemberDeclaration = 17, base: MemberDeclaration, is_abstract: false;
    MethodDeclaration = 18, base: MemberDeclaration, is_abstract: false;
    ConstructorDeclaration = 19, base: MemberDeclaration, is_abstract: false;
    FieldDeclaration = 20, base: MemberDeclaration, is_abstract: false;
    PropertyDeclaration = 21, base: MemberDeclaration, is_abstract: false;
    ConstructorInitializer = 22, base: Positioned, is_abstract: false;
    Parameter = 23, base: Positioned, is_abstract: false;
    Argument = 24, base: Positioned, is_abstract: false;
    VariableDeclaration = 25, base: Positioned, is_abstract: false;
    VariableDeclarator = 26, base: Positioned, is_abstract: false;
    AttributeList = 27, base: Positioned, is_abstract: false;
    Attribute = 28, base: Positioned, is_abstract: false;
    Block = 29, base: Statement, is_abstract: false;
    ExpressionStatement = 30, base: Statement, is_abstract: false;
    ReturnStatement = 31, base: Statement, is_abstract: false;
    LocalDeclarationStatement = 32, base: Statement, is_abstract: false;
    IfStatement = 33, base: Statement, is_abstract: false;
    IdentifierName = 34, base: Name, is_abstract: false;
    QualifiedName = 35, base: Name, is_abstract: false;
    PredefinedType = 36, base: TypeSyntax, is_abstract: false;
    LiteralExpression = 37, base: Expression, is_abstract: false;
    BinaryExpression = 38, base: Expression, is_abstract: false;
    InvocationExpression = 39, base: Expression, is_abstract: false;
    MemberAccessExpression = 40, base: Expression, is_abstract: false;
    ObjectCreationExpression = 41, base: Expression, is_abstract: false;
}

edge_kinds! {
    CompilationUnitUsings: CompilationUnit."usings" => UsingDirective, Multiple, Owning;
    CompilationUnitMembers: CompilationUnit."members" => MemberDeclaration, Multiple, Owning;
    CompilationUnitAttributeLists: CompilationUnit."attribute_lists" => AttributeList, Multiple, Owning, assoc Str;
    UsingDirectiveName: UsingDirective."name" => Name, Single, Owning;
    NamespaceDeclarationName: NamespaceDeclaration."name" => Name, Single, Owning;
    NamespaceDeclarationUsings: NamespaceDeclaration."usings" => UsingDirective, Multiple, Owning;
    NamespaceDeclarationMembers: NamespaceDeclaration."members" => MemberDeclaration, Multiple, Owning;
    TypeDeclarationMembers: TypeDeclaration."members" => MemberDeclaration, Multiple, Owning;
    TypeDeclarationBaseTypes: TypeDeclaration."base_types" => TypeSyntax, Multiple, Owning;
    EnumDeclarationMembers: EnumDeclaration."members" => EnumMemberDeclaration, Multiple, Owning;
    EnumMemberDeclarationEqualsValue: EnumMemberDeclaration."equals_value" => Expression, Single, Owning;
    MethodDeclarationReturnType: MethodDeclaration."return_type" => TypeSyntax, Single, Owning;
    MethodDeclarationParameters: MethodDeclaration."parameters" => Parameter, Multiple, Owning;
    MethodDeclarationBody: MethodDeclaration."body" => Block, Single, Owning;
    ConstructorDeclarationParameters: ConstructorDeclaration."parameters" => Parameter, Multiple, Owning;
    ConstructorDeclarationInitializer: ConstructorDeclaration."initializer" => ConstructorInitializer, Single, Owning;
    ConstructorDeclarationBody: ConstructorDeclaration."body" => Block, Single, Owning;
    FieldDeclarationDeclaration: FieldDeclaration."declaration" => VariableDeclaration, Single, Owning;
    PropertyDeclarationType: PropertyDeclaration."type" => TypeSyntax, Single, Owning;
    ConstructorInitializerArguments: ConstructorInitializer."arguments" => Argument, Multiple, Owning;
    ConstructorInitializerConstructorCall: ConstructorInitializer."constructor_call" => ConstructorDeclaration, Single, Reference;
    ParameterType: Parameter."type" => TypeSyntax, Single, Owning;
    ArgumentExpression: Argument."expression" => Expression, Single, Owning;
    VariableDeclarationType: VariableDeclaration."type" => TypeSyntax, Single, Owning;
    VariableDeclarationVariables: VariableDeclaration."variables" => VariableDeclarator, Multiple, Owning;
    VariableDeclaratorInitializer: VariableDeclarator."initializer" => Expression, Single, Owning;
    AttributeListAttributes: AttributeList."attributes" => Attribute, Multiple, Owning;
    AttributeName: Attribute."name" => Name, Single, Owning;
    AttributeArguments: Attribute."arguments" => Argument, Multiple, Owning;
    BlockStatements: Block."statements" => Statement, Multiple, Owning;
    ExpressionStatementExpression: ExpressionStatement."expression" => Expression, Single, Owning;
    ReturnStatementExpression: ReturnStatement."expression" => Expression, Single, Owning;
    LocalDeclarationStatementDeclaration: LocalDeclarationStatement."declaration" => VariableDeclaration, Single, Owning;
    IfStatementCondition: IfStatement."condition" => Expression, Single, Owning;
    IfStatementStatement: IfStatement."statement" => Statement, Single, Owning;
    IfStatementElse: IfStatement."else" => Statement, Single, Owning;
    IdentifierNameDeclaration: IdentifierName."declaration" => Positioned, Single, Reference;
    QualifiedNameLeft: QualifiedName."left" => Name, Single, Owning;
    QualifiedNameRight: QualifiedName."right" => IdentifierName, Single, Owning;
    BinaryExpressionLeft: BinaryExpression."left" => Expression, Single, Owning;
    BinaryExpressionRight: BinaryExpression."right" => Expression, Single, Owning;
    InvocationExpressionExpression: InvocationExpression."expression" => Expression, Single, Owning;
    InvocationExpressionArguments: InvocationExpression."arguments" => Argument, Multiple, Owning;
    InvocationExpressionMethodCall: InvocationExpression."method_call" => MethodDeclaration, Single, Reference;
    InvocationExpressionCandidates: InvocationExpression."candidates" => MethodDeclaration, Multiple, Reference;
    MemberAccessExpressionExpression: MemberAccessExpression."expression" => Expression, Single, Owning;
    MemberAccessExpressionName: MemberAccessExpression."name" => IdentifierName, Single, Owning;
    ObjectCreationExpressionType: ObjectCreationExpression."type" => TypeSyntax, Single, Owning;
    ObjectCreationExpressionArguments: ObjectCreationExpression."arguments" => Argument, Multiple, Owning;
    ObjectCreationExpressionConstructorCall: ObjectCreationExpression."constructor_call" => ConstructorDeclaration, Single, Reference;
}

attr_kinds! {
    MemberDeclarationAccessibility: MemberDeclaration."accessibility" => Int;
    BaseTypeDeclarationIdentifier: BaseTypeDeclaration."identifier" => Str;
    ClassDeclarationIsPartial: ClassDeclaration."is_partial" => Bool;
    UsingDirectiveAlias: UsingDirective."alias" => Str;
    UsingDirectiveIsStatic: UsingDirective."is_static" => Bool;
    EnumMemberDeclarationIdentifier: EnumMemberDeclaration."identifier" => Str;
    MethodDeclarationIdentifier: MethodDeclaration."identifier" => Str;
    ConstructorDeclarationIdentifier: ConstructorDeclaration."identifier" => Str;
    PropertyDeclarationIdentifier: PropertyDeclaration."identifier" => Str;
    ConstructorInitializerKeyword: ConstructorInitializer."keyword" => Str;
    ParameterIdentifier: Parameter."identifier" => Str;
    VariableDeclaratorIdentifier: VariableDeclarator."identifier" => Str;
    LocalDeclarationStatementIsConst: LocalDeclarationStatement."is_const" => Bool;
    IdentifierNameIdentifier: IdentifierName."identifier" => Str;
    PredefinedTypeKeyword: PredefinedType."keyword" => Str;
    LiteralExpressionToken: LiteralExpression."token" => Str;
    BinaryExpressionOperator: BinaryExpression."operator" => Str;
}

const _: () = assert!(NodeKind::ALL.len() <= 64, "ancestor bitsets are u64");

/// Schema identity written into the `csi` metadata block.
pub const SCHEMA_NAME: &str = "csharp";
/// Version of the node/edge/attribute catalog.
pub const API_VERSION: &str = "1.0.0";
/// Version of the binary payload layout.
pub const BINARY_VERSION: &str = "1.0";

impl NodeKind {
    pub fn spec(self) -> &'static KindSpec {
        &KIND_SPECS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn tag(self) -> u16 {
        self as u16
    }

    /// `true` for kinds that may be instantiated as nodes.
    pub fn is_concrete(self) -> bool {
        !self.spec().is_abstract
    }
}

impl EdgeKind {
    pub fn spec(self) -> &'static EdgeSpec {
        &EDGE_SPECS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn tag(self) -> u16 {
        self as u16
    }

    pub fn from_tag(tag: u16) -> Option<EdgeKind> {
        EdgeKind::ALL.get(tag as usize).copied()
    }
}

impl AttrKind {
    pub fn spec(self) -> &'static AttrSpec {
        &ATTR_SPECS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }
}

/// Precomputed lookup tables over the static catalog.
#[derive(Debug)]
pub struct Schema {
    /// Bit `b` of `ancestors[k]` is set iff kind `k` is `b` or descends from it.
    ancestors: Vec<u64>,
    /// Effective edges per kind, in slot order.
    edge_slots: Vec<Vec<EdgeKind>>,
    /// Effective attributes per kind, in slot order.
    attr_slots: Vec<Vec<AttrKind>>,
    edge_slot_index: Vec<usize>,
    attr_slot_index: Vec<usize>,
}

/// Returns the process-wide schema, building it on first use.
pub fn schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(Schema::build)
}

impl Schema {
    fn build() -> Schema {
        let count = NodeKind::ALL.len();
        let mut ancestors = vec![0u64; count];
        let mut edge_slots = Vec::with_capacity(count);
        let mut attr_slots = Vec::with_capacity(count);

        for &kind in NodeKind::ALL {
            let chain = Self::chain(kind);
            for &k in &chain {
                ancestors[kind as usize] |= 1u64 << (k as u16);
            }
            edge_slots.push(
                chain
                    .iter()
                    .flat_map(|&k| EDGE_SPECS.iter().filter(move |e| e.owner == k))
                    .map(|e| e.kind)
                    .collect::<Vec<_>>(),
            );
            attr_slots.push(
                chain
                    .iter()
                    .flat_map(|&k| ATTR_SPECS.iter().filter(move |a| a.owner == k))
                    .map(|a| a.kind)
                    .collect::<Vec<_>>(),
            );
        }

        let edge_slot_index = EDGE_SPECS
            .iter()
            .map(|e| {
                edge_slots[e.owner as usize]
                    .iter()
                    .position(|&k| k == e.kind)
                    .unwrap_or_default()
            })
            .collect();
        let attr_slot_index = ATTR_SPECS
            .iter()
            .map(|a| {
                attr_slots[a.owner as usize]
                    .iter()
                    .position(|&k| k == a.kind)
                    .unwrap_or_default()
            })
            .collect();

        Schema {
            ancestors,
            edge_slots,
            attr_slots,
            edge_slot_index,
            attr_slot_index,
        }
    }

    /// Ancestor chain of `kind`, hierarchy root first. Empty for `None`.
    fn chain(kind: NodeKind) -> Vec<NodeKind> {
        let mut chain = Vec::new();
        let mut current = kind;
        while current != NodeKind::None {
            chain.push(current);
            current = current.spec().base;
        }
        chain.reverse();
        chain
    }

    /// `true` iff `actual` is `base` or one of its descendants.
    pub fn is_descendant(&self, actual: NodeKind, base: NodeKind) -> bool {
        self.ancestors[actual as usize] & (1u64 << (base as u16)) != 0
    }

    pub fn is_positioned(&self, kind: NodeKind) -> bool {
        self.is_descendant(kind, NodeKind::Positioned)
    }

    /// Edges of `kind` (inherited first), in slot order.
    pub fn edges_of(&self, kind: NodeKind) -> &[EdgeKind] {
        &self.edge_slots[kind as usize]
    }

    /// Attributes of `kind` (inherited first), in slot order.
    pub fn attrs_of(&self, kind: NodeKind) -> &[AttrKind] {
        &self.attr_slots[kind as usize]
    }

    /// Slot index of `edge` in every kind that has it.
    pub fn edge_slot(&self, edge: EdgeKind) -> usize {
        self.edge_slot_index[edge as usize]
    }

    /// Slot index of `attr` in every kind that has it.
    pub fn attr_slot(&self, attr: AttrKind) -> usize {
        self.attr_slot_index[attr as usize]
    }

    pub fn has_edge(&self, kind: NodeKind, edge: EdgeKind) -> bool {
        self.is_descendant(kind, edge.spec().owner)
    }

    pub fn has_attr(&self, kind: NodeKind, attr: AttrKind) -> bool {
        self.is_descendant(kind, attr.spec().owner)
    }

    /// Reflection: resolves an edge of `kind` by its declared name.
    pub fn edge_by_name(&self, kind: NodeKind, name: &str) -> Option<EdgeKind> {
        self.edges_of(kind)
            .iter()
            .copied()
            .find(|e| e.name() == name)
    }

    /// Reflection: resolves an attribute of `kind` by its declared name.
    pub fn attr_by_name(&self, kind: NodeKind, name: &str) -> Option<AttrKind> {
        self.attrs_of(kind)
            .iter()
            .copied()
            .find(|a| a.name() == name)
    }

    pub fn kind_by_name(&self, name: &str) -> Option<NodeKind> {
        NodeKind::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Constructor dispatch: builds an empty node of `kind` at `id`.
    ///
    /// Returns [`CoreError::InvalidNodeKind`] for `None` and abstract kinds.
    pub fn instantiate(&self, kind: NodeKind, id: NodeId) -> Result<Node, CoreError> {
        if !kind.is_concrete() {
            return Err(CoreError::InvalidNodeKind {
                tag: kind.tag(),
                reason: format!("{} is abstract", kind.name()),
            });
        }
        Ok(Node::empty(self, kind, id))
    }
}
